//! Directories that hold an instance marker but have no registry entry,
//! typically left behind by a creation that was killed before registering.

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use super::Orchestrator;
use crate::error::{AppError, Result};
use crate::paths::MARKER_FILE_NAME;
use crate::registry::{find_by_directory, read_marker, InstanceMarker, RegistryMap};
use crate::validation::validate_instance_name;

#[derive(Debug, Clone, Serialize)]
pub struct Orphan {
    pub directory: PathBuf,
    pub marker: InstanceMarker,
}

impl Orphan {
    /// Registry name used on adoption: the directory's base name.
    pub fn name(&self) -> String {
        self.directory
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.marker.name.clone())
    }
}

/// Immediate sub-directories of `base` with a readable marker and no entry.
pub fn find_orphans(base: &Path, map: &RegistryMap) -> Result<Vec<Orphan>> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let mut orphans = Vec::new();
    for entry in WalkDir::new(base).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_dir() || !entry.path().join(MARKER_FILE_NAME).is_file() {
            continue;
        }
        let directory = entry.into_path();
        if find_by_directory(map, &directory).is_some() {
            continue;
        }
        match read_marker(&directory) {
            Ok(Some(marker)) => orphans.push(Orphan { directory, marker }),
            Ok(None) => {}
            Err(e) => log::warn!("Skipping {}: {}", directory.display(), e),
        }
    }
    Ok(orphans)
}

impl Orchestrator<'_> {
    /// Register an orphan from its marker.
    pub fn adopt(&self, orphan: &Orphan) -> Result<String> {
        let name = orphan.name();
        validate_instance_name(&name)?;
        let record = orphan.marker.to_record(&orphan.directory);
        self.registry.register(&name, record, &[])?;
        Ok(name)
    }

    /// Delete an orphan's directory. The caller has already confirmed.
    pub fn discard(&self, orphan: &Orphan) -> Result<()> {
        if let Err(e) = self.runtime.teardown(&orphan.directory) {
            self.output
                .warning(&format!("Container teardown failed: {}", e));
        }
        std::fs::remove_dir_all(&orphan.directory).map_err(|e| {
            AppError::io(format!(
                "Failed to delete {}: {}",
                orphan.directory.display(),
                e
            ))
        })
    }
}
