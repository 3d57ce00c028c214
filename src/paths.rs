//! Centralized path utilities for the application.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{AppError, Result};

/// Environment variable that overrides the storage root.
pub const DATA_DIR_ENV: &str = "STACKYARD_DATA_DIR";

const APP_DIR_NAME: &str = "stackyard";
const FALLBACK_DIR_NAME: &str = ".stackyard-data";
const REGISTRY_FILE_NAME: &str = "instances.json";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Name of the per-instance marker file kept inside every instance directory.
pub const MARKER_FILE_NAME: &str = ".stackyard-instance.json";

static FALLBACK_WARNED: AtomicBool = AtomicBool::new(false);

/// Location of every shared file the tool persists.
///
/// All registry and config operations take a layout explicitly, so tests can
/// point them at a temporary directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Use `root` as-is. The directory is created lazily by [`StorageLayout::ensure`].
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the storage root: explicit override, then `STACKYARD_DATA_DIR`,
    /// then the per-user config directory, then `./.stackyard-data`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(dir) = explicit {
            return Ok(Self::at(dir));
        }
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::at(PathBuf::from(dir)));
        }
        match dirs::config_dir() {
            Some(config_dir) => Ok(Self::at(config_dir.join(APP_DIR_NAME))),
            None => {
                let cwd = std::env::current_dir()
                    .map_err(|e| AppError::io(format!("Failed to get current directory: {}", e)))?;
                let fallback = cwd.join(FALLBACK_DIR_NAME);
                if !FALLBACK_WARNED.swap(true, Ordering::SeqCst) {
                    log::warn!(
                        "User config directory not found, using fallback data directory {}",
                        fallback.display()
                    );
                }
                Ok(Self::at(fallback))
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Central instance registry file.
    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE_NAME)
    }

    /// Global configuration file, sibling of the registry.
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Sentinel guarding writes to the registry.
    pub fn sentinel_path(&self) -> PathBuf {
        sentinel_for(&self.registry_path())
    }

    /// Create the storage root with owner-only permissions.
    pub fn ensure(&self) -> Result<()> {
        create_private_dir(&self.root)
    }
}

/// Sentinel path derived from the file it protects (`<file>.lock`).
pub fn sentinel_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Local marker path for an instance directory.
pub fn marker_path(instance_dir: &Path) -> PathBuf {
    instance_dir.join(MARKER_FILE_NAME)
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt as _;

    if dir.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|e| AppError::io(format!("Failed to create data dir {}: {}", dir.display(), e)))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::io(format!("Failed to create data dir {}: {}", dir.display(), e)))
}

/// Expand a leading `~` and make the path absolute against the current directory.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_path(Path::new(raw), "path cannot be empty"));
    }

    let expanded = if trimmed == "~" {
        home_dir()?
    } else if let Some(rest) = trimmed
        .strip_prefix("~/")
        .or_else(|| trimmed.strip_prefix("~\\"))
    {
        home_dir()?.join(rest)
    } else {
        PathBuf::from(trimmed)
    };

    absolutize(&expanded)
}

/// Make `path` absolute without touching the file system beyond reading the cwd.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| AppError::io(format!("Failed to get current directory: {}", e)))?;
    Ok(cwd.join(path))
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Cannot find home directory"))
}

/// Shorten a path for table display: `~` for the home directory, then a leading `...`.
pub fn shorten_path(path: &Path, max_len: usize) -> String {
    let full = path.display().to_string();
    if full.chars().count() <= max_len {
        return full;
    }

    if let Some(home) = dirs::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            let shortened = format!("~/{}", rest.display());
            if shortened.chars().count() <= max_len {
                return shortened;
            }
        }
    }

    if max_len < 4 {
        return "...".to_string();
    }
    let keep = max_len - 3;
    let tail: String = full
        .chars()
        .rev()
        .take(keep)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{}", tail)
}
