//! Registry record types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Placeholder for fields nobody has filled in yet.
pub const UNKNOWN: &str = "Unknown";

/// Instance name to record. Sorted so the persisted file and listings are stable.
pub type RegistryMap = BTreeMap<String, InstanceRecord>;

/// One managed environment as tracked by the central registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub directory: PathBuf,
    #[serde(default = "unknown")]
    pub creation_timestamp: String,
    #[serde(default = "unknown")]
    pub software_version: String,
    #[serde(default = "unknown")]
    pub database_version: String,
    #[serde(default)]
    pub assigned_port: Option<u16>,
    #[serde(default)]
    pub status: InstanceStatus,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

impl InstanceRecord {
    /// New record stamped with the current local time.
    pub fn new(directory: PathBuf, assigned_port: Option<u16>) -> Self {
        Self {
            directory,
            creation_timestamp: now_timestamp(),
            software_version: unknown(),
            database_version: unknown(),
            assigned_port,
            status: InstanceStatus::Unknown,
        }
    }
}

/// Human-readable creation time, e.g. `2026-03-01 14:05:09`.
pub fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceStatus {
    Running,
    Stopped,
    #[default]
    Unknown,
    #[serde(rename = "Directory Missing")]
    DirectoryMissing,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Unknown => write!(f, "Unknown"),
            Self::DirectoryMissing => write!(f, "Directory Missing"),
        }
    }
}
