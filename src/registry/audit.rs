use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use super::types::RegistryMap;

/// Soft invariants of the registry that are only checked at mutation time,
/// re-checked after the fact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Audit {
    /// Port to every instance that records it, where more than one does.
    pub duplicate_ports: BTreeMap<u16, Vec<String>>,
    /// Directory to every instance registered for it, where more than one is.
    pub duplicate_directories: BTreeMap<PathBuf, Vec<String>>,
    /// Instances whose directory does not exist.
    pub missing_directories: Vec<String>,
}

impl Audit {
    pub fn is_clean(&self) -> bool {
        self.duplicate_ports.is_empty()
            && self.duplicate_directories.is_empty()
            && self.missing_directories.is_empty()
    }
}

pub fn audit(map: &RegistryMap) -> Audit {
    let mut ports: BTreeMap<u16, Vec<String>> = BTreeMap::new();
    let mut directories: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    let mut missing_directories = Vec::new();

    for (name, record) in map {
        if let Some(port) = record.assigned_port {
            ports.entry(port).or_default().push(name.clone());
        }
        directories
            .entry(record.directory.clone())
            .or_default()
            .push(name.clone());
        if !record.directory.exists() {
            missing_directories.push(name.clone());
        }
    }

    ports.retain(|_, names| names.len() > 1);
    directories.retain(|_, names| names.len() > 1);

    Audit {
        duplicate_ports: ports,
        duplicate_directories: directories,
        missing_directories,
    }
}
