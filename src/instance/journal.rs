//! Record of what a creation run has put on disk, so a failed run can remove
//! exactly that and nothing else.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// Missing ancestor created on the way to the instance directory.
    Parent(PathBuf),
    /// The instance directory itself; everything inside it belongs to the run.
    Instance(PathBuf),
}

#[derive(Debug, Default)]
pub struct CreationJournal {
    steps: Vec<Step>,
}

impl CreationJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `dir` and any missing ancestors, journalling each one.
    /// Fails if `dir` already exists.
    pub fn create_instance_dir(&mut self, dir: &Path) -> Result<()> {
        if dir.exists() {
            return Err(AppError::invalid_path(dir, "already exists"));
        }

        let mut missing: Vec<&Path> = dir
            .ancestors()
            .skip(1)
            .take_while(|ancestor| !ancestor.as_os_str().is_empty() && !ancestor.exists())
            .collect();
        missing.reverse();
        for parent in missing {
            std::fs::create_dir(parent).map_err(|e| {
                AppError::io(format!("Failed to create {}: {}", parent.display(), e))
            })?;
            self.steps.push(Step::Parent(parent.to_path_buf()));
        }

        std::fs::create_dir(dir)
            .map_err(|e| AppError::io(format!("Failed to create {}: {}", dir.display(), e)))?;
        self.steps.push(Step::Instance(dir.to_path_buf()));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Undo every journalled step, newest first. Failures are collected, not
    /// fatal, so rollback always runs to the end.
    pub fn rollback(self) -> Vec<String> {
        let mut problems = Vec::new();
        for step in self.steps.into_iter().rev() {
            match step {
                Step::Instance(dir) => {
                    log::info!("Rolling back {}", dir.display());
                    if let Err(e) = std::fs::remove_dir_all(&dir) {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            problems.push(format!("{}: {}", dir.display(), e));
                        }
                    }
                }
                Step::Parent(dir) => {
                    // Only if still empty; something else may have been put there since.
                    if let Err(e) = std::fs::remove_dir(&dir) {
                        log::debug!("Leaving {} in place: {}", dir.display(), e);
                    }
                }
            }
        }
        problems
    }
}
