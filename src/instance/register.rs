use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use super::Orchestrator;
use crate::error::{AppError, Result};
use crate::paths::absolutize;
use crate::registry::{seed_record, Conflict, InstanceRecord};
use crate::validation::validate_instance_name;

#[derive(Debug, Clone, Serialize)]
pub struct Registered {
    pub name: String,
    pub record: InstanceRecord,
    /// Entries that were replaced after the user confirmed.
    pub replaced: Vec<String>,
}

impl Orchestrator<'_> {
    /// Register an existing instance directory. The name defaults to the
    /// directory's base name. Conflicts are only overridden after confirmation.
    pub fn register_existing(&self, path: &Path, name: Option<&str>) -> Result<Registered> {
        let directory = absolutize(path)?;
        let record = seed_record(&directory)?;
        let name = match name {
            Some(name) => name.to_string(),
            None => directory
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| AppError::invalid_path(&directory, "has no base name"))?,
        };
        validate_instance_name(&name)?;

        let conflicts = self.registry.conflicts(&name, &directory)?;
        for conflict in &conflicts {
            let question = match conflict {
                Conflict::Name { directory: existing } => format!(
                    "'{}' is already registered for {}. Replace it?",
                    name,
                    existing.display()
                ),
                Conflict::Directory { name: other } => format!(
                    "{} is already registered as '{}'. Re-register it as '{}'?",
                    directory.display(),
                    other,
                    name
                ),
            };
            if !self.confirm.confirm(&question) {
                return Err(conflict.clone().into_error(&name, &directory));
            }
        }

        let replaced = self.registry.register(&name, record.clone(), &conflicts)?;
        Ok(Registered {
            name,
            record,
            replaced,
        })
    }

    /// List entries whose directory is gone and, after confirmation, drop them.
    /// Returns the removed names, empty when there was nothing to prune.
    pub fn prune(&self) -> Result<Vec<String>> {
        let candidates = self.registry.prune_candidates()?;
        if candidates.is_empty() {
            self.output.success("No instances with missing directories.");
            return Ok(Vec::new());
        }

        self.output
            .status("Instances whose directory no longer exists:");
        for (name, record) in &candidates {
            self.output
                .plain(&format!("  {}  ({})", name, record.directory.display()));
        }
        if !self.confirm.confirm(&format!(
            "Remove {} registry entr{}?",
            candidates.len(),
            if candidates.len() == 1 { "y" } else { "ies" }
        )) {
            return Err(AppError::cancelled("prune declined"));
        }

        let confirmed: BTreeSet<String> = candidates.into_keys().collect();
        self.registry.prune(&confirmed)
    }
}
