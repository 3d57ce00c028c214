//! Per-instance marker kept inside each instance directory.
//!
//! The marker mirrors the central record so an instance can be re-registered
//! or adopted if the registry entry is lost.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::types::{InstanceRecord, InstanceStatus, UNKNOWN};
use crate::envfile;
use crate::error::{AppError, Result};
use crate::paths::marker_path;
use crate::store::{self, Format};

/// Files a directory must hold to be treated as an instance.
pub const REQUIRED_FILES: [&str; 2] = ["docker-compose.yml", ".env"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMarker {
    pub name: String,
    #[serde(default = "unknown")]
    pub creation_timestamp: String,
    #[serde(default = "unknown")]
    pub software_version: String,
    #[serde(default = "unknown")]
    pub database_version: String,
    #[serde(default)]
    pub assigned_port: Option<u16>,
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,
    #[serde(default)]
    pub status: InstanceStatus,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

impl InstanceMarker {
    pub fn from_record(name: &str, record: &InstanceRecord, ports: BTreeMap<String, u16>) -> Self {
        Self {
            name: name.to_string(),
            creation_timestamp: record.creation_timestamp.clone(),
            software_version: record.software_version.clone(),
            database_version: record.database_version.clone(),
            assigned_port: record.assigned_port,
            ports,
            status: record.status,
        }
    }

    /// Central record for this marker living in `directory`.
    pub fn to_record(&self, directory: &Path) -> InstanceRecord {
        InstanceRecord {
            directory: directory.to_path_buf(),
            creation_timestamp: self.creation_timestamp.clone(),
            software_version: self.software_version.clone(),
            database_version: self.database_version.clone(),
            assigned_port: self.assigned_port,
            status: self.status,
        }
    }
}

/// Read the marker in `directory`. `Ok(None)` when there is none.
pub fn read_marker(directory: &Path) -> Result<Option<InstanceMarker>> {
    store::read_strict(&marker_path(directory), Format::Json)
}

pub fn write_marker(directory: &Path, marker: &InstanceMarker) -> Result<()> {
    store::write_atomic(&marker_path(directory), Format::Json, marker)
}

/// Best-effort mirror of a status change into the marker. Missing or
/// unreadable markers are skipped with a log line.
pub fn sync_marker_status(directory: &Path, status: InstanceStatus) {
    let marker = match read_marker(directory) {
        Ok(Some(marker)) => marker,
        Ok(None) => return,
        Err(e) => {
            log::warn!("Skipping marker update in {}: {}", directory.display(), e);
            return;
        }
    };
    if marker.status == status {
        return;
    }
    let updated = InstanceMarker { status, ..marker };
    if let Err(e) = write_marker(directory, &updated) {
        log::warn!("Failed to update marker in {}: {}", directory.display(), e);
    }
}

/// Check that `directory` looks like an instance: it exists and holds the
/// compose file and `.env`.
pub fn ensure_instance_dir(directory: &Path) -> Result<()> {
    if !directory.exists() {
        return Err(AppError::directory_missing(directory));
    }
    if !directory.is_dir() {
        return Err(AppError::invalid_path(directory, "not a directory"));
    }
    let missing: Vec<&str> = REQUIRED_FILES
        .into_iter()
        .filter(|file| !directory.join(file).is_file())
        .collect();
    if !missing.is_empty() {
        return Err(AppError::invalid_path(
            directory,
            format!("missing {}", missing.join(", ")),
        ));
    }
    Ok(())
}

/// Build a record for an existing instance directory, from its marker when
/// there is one and from `.env` otherwise.
pub fn seed_record(directory: &Path) -> Result<InstanceRecord> {
    ensure_instance_dir(directory)?;

    match read_marker(directory) {
        Ok(Some(marker)) => return Ok(marker.to_record(directory)),
        Ok(None) => {}
        Err(e) => log::warn!(
            "Ignoring unreadable marker in {}: {}",
            directory.display(),
            e
        ),
    }

    let env = envfile::read(&directory.join(".env"))?;
    let field = |key: &str| {
        env.get(key)
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(unknown)
    };
    Ok(InstanceRecord {
        directory: directory.to_path_buf(),
        creation_timestamp: unknown(),
        software_version: field("SOFTWARE_VERSION"),
        database_version: field("DB_VERSION"),
        assigned_port: env.get("WEB_PORT").and_then(|port| port.parse().ok()),
        status: InstanceStatus::Unknown,
    })
}
