use std::collections::BTreeMap;

use serde::Serialize;

use super::Orchestrator;
use crate::error::Result;
use crate::registry::{sync_marker_status, InstanceRecord, InstanceStatus};
use crate::runtime::{is_site_running, ContainerRuntime};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub name: String,
    pub from: InstanceStatus,
    pub to: InstanceStatus,
}

/// Current status of one instance as seen on disk and by the runtime.
pub fn scan_status(record: &InstanceRecord, runtime: &dyn ContainerRuntime) -> InstanceStatus {
    if !record.directory.exists() {
        return InstanceStatus::DirectoryMissing;
    }
    match runtime.running_services(&record.directory) {
        Ok(services) if is_site_running(&services) => InstanceStatus::Running,
        Ok(_) => InstanceStatus::Stopped,
        Err(e) => {
            log::warn!("Could not query {}: {}", record.directory.display(), e);
            InstanceStatus::Unknown
        }
    }
}

impl Orchestrator<'_> {
    /// Query every instance, then write all changed statuses in one
    /// transaction. The runtime is queried without holding the lock.
    pub fn refresh_statuses(&self) -> Result<Vec<StatusChange>> {
        let map = self.registry.list()?;
        let scanned: BTreeMap<String, InstanceStatus> = map
            .iter()
            .map(|(name, record)| (name.clone(), scan_status(record, self.runtime)))
            .collect();

        let changed = self.registry.apply_statuses(&scanned)?;

        let mut changes = Vec::with_capacity(changed.len());
        for name in changed {
            let (Some(record), Some(to)) = (map.get(&name), scanned.get(&name)) else {
                continue;
            };
            if *to != InstanceStatus::DirectoryMissing {
                sync_marker_status(&record.directory, *to);
            }
            changes.push(StatusChange {
                name,
                from: record.status,
                to: *to,
            });
        }
        Ok(changes)
    }
}
