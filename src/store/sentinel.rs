//! Advisory cross-process lock built on exclusive file creation.
//!
//! The sentinel is a zero-byte file; its existence is the lock. Acquisition
//! never waits: if the file exists the caller gets `LockHeld` and must re-run.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::{AppError, Result};

/// Held sentinel. Dropping the guard removes the sentinel file.
#[derive(Debug)]
pub struct SentinelGuard {
    path: PathBuf,
    released: bool,
}

impl SentinelGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release explicitly, surfacing a removal error instead of logging it.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        unlock(&self.path)
    }
}

impl Drop for SentinelGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = unlock(&self.path) {
            log::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

/// Try to create the sentinel at `path`.
pub fn lock(path: &Path) -> Result<SentinelGuard> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt as _;
        options.mode(0o600);
    }

    match options.open(path) {
        Ok(_) => {
            log::debug!("Acquired lock {}", path.display());
            Ok(SentinelGuard {
                path: path.to_path_buf(),
                released: false,
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(AppError::lock_held(path)),
        Err(e) => Err(AppError::io(format!(
            "Failed to create lock {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Remove the sentinel. Removing an absent sentinel is not an error.
pub fn unlock(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::io(format!(
            "Failed to remove lock {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Age of an existing sentinel, `None` when no sentinel is present.
pub fn held_for(path: &Path) -> Option<Duration> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default(),
    )
}

/// Run `f` while holding the sentinel. The sentinel is released on every exit path.
pub fn with_lock<T>(path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let guard = lock(path)?;
    let result = f();
    let released = guard.release();
    let value = result?;
    released?;
    Ok(value)
}
