use std::path::{Path, PathBuf};

use serde::Serialize;

use super::Orchestrator;
use crate::error::{AppError, ErrorKind, Result};

#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub name: String,
    pub directory: PathBuf,
    /// The directory was already gone; only the registry entry was removed.
    pub directory_missing: bool,
    /// The directory is gone after the run.
    pub directory_removed: bool,
    pub warnings: Vec<String>,
}

impl Orchestrator<'_> {
    /// Tear down and delete an instance. The caller has already confirmed.
    ///
    /// Order: stop containers, delete the directory, then drop the registry
    /// entry. Teardown and removal problems become warnings; the entry is
    /// removed either way.
    pub fn delete(&self, name: &str) -> Result<DeleteReport> {
        let record = self.registry.get(name)?;
        let directory = record.directory;
        let mut report = DeleteReport {
            name: name.to_string(),
            directory: directory.clone(),
            directory_missing: !directory.exists(),
            directory_removed: false,
            warnings: Vec::new(),
        };

        if report.directory_missing {
            self.output.status(&format!(
                "Directory {} is already gone, removing registry entry only",
                directory.display()
            ));
        } else {
            self.output.status("Stopping containers and removing volumes...");
            if let Err(e) = self.runtime.teardown(&directory) {
                self.warn(&mut report, format!("Container teardown failed: {}", e));
            }

            self.output.status("Deleting instance directory...");
            match self.remove_directory(&directory) {
                Ok(()) => report.directory_removed = true,
                Err(e) => self.warn(
                    &mut report,
                    format!("Directory {} was not fully removed: {}", directory.display(), e),
                ),
            }
        }

        match self.registry.unregister(name) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::InstanceNotFound => {
                self.warn(&mut report, "Registry entry was already removed".to_string());
            }
            Err(e) => return Err(e),
        }
        Ok(report)
    }

    fn warn(&self, report: &mut DeleteReport, message: String) {
        self.output.warning(&message);
        report.warnings.push(message);
    }

    fn remove_directory(&self, directory: &Path) -> Result<()> {
        match std::fs::remove_dir_all(directory) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                // Containers often leave root-owned files behind.
                let question = format!(
                    "Permission denied deleting {}. Retry with elevated privileges?",
                    directory.display()
                );
                if !self.confirm.confirm(&question) {
                    return Err(AppError::cancelled("elevated removal declined"));
                }
                remove_elevated(directory)
            }
            Err(e) => Err(AppError::io(format!(
                "Failed to delete {}: {}",
                directory.display(),
                e
            ))),
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn remove_elevated(directory: &Path) -> Result<()> {
    let status = std::process::Command::new("sudo")
        .arg("rm")
        .arg("-rf")
        .arg(directory)
        .status()
        .map_err(|e| AppError::io(format!("Failed to run sudo: {}", e)))?;
    if status.success() {
        Ok(())
    } else {
        Err(AppError::io(format!("sudo rm -rf exited with {}", status)))
    }
}

#[cfg(target_os = "windows")]
fn remove_elevated(directory: &Path) -> Result<()> {
    let command = format!(
        "Remove-Item -LiteralPath '{}' -Recurse -Force",
        directory.display().to_string().replace('\'', "''")
    );
    let status = std::process::Command::new("powershell")
        .args(["-NoProfile", "-Command", &command])
        .status()
        .map_err(|e| AppError::io(format!("Failed to run PowerShell: {}", e)))?;
    if status.success() {
        Ok(())
    } else {
        Err(AppError::io(format!("Remove-Item exited with {}", status)))
    }
}
