//! Crash-safe persistence of structured records.
//!
//! Writes go to a uniquely named temp file in the target's directory, are
//! flushed and synced, then renamed over the target. A reader therefore sees
//! either the old file or the new one, never a partial write.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AppError, Result};

/// Serialization used for a persisted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    fn encode<T: Serialize>(self, value: &T) -> Result<String> {
        match self {
            Self::Json => {
                let mut text = serde_json::to_string_pretty(value)?;
                text.push('\n');
                Ok(text)
            }
            Self::Toml => Ok(toml::to_string_pretty(value)?),
        }
    }

    fn decode<T: DeserializeOwned>(self, text: &str) -> std::result::Result<T, String> {
        match self {
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
        }
    }
}

/// Result of a lenient read.
#[derive(Debug)]
pub struct Loaded<T> {
    pub value: T,
    /// Parse error message when the file existed but could not be decoded.
    /// `value` is the default in that case.
    pub corrupt: Option<String>,
}

/// Read a record, returning the default when the file is missing or empty and
/// an explicit parse error otherwise.
fn read_raw<T: DeserializeOwned + Default>(
    path: &Path,
    format: Format,
) -> Result<std::result::Result<T, String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Ok(T::default())),
        Err(e) => {
            return Err(AppError::io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    let content = content.trim_start_matches('\u{feff}');
    if content.trim().is_empty() {
        return Ok(Ok(T::default()));
    }
    Ok(format.decode(content))
}

/// Lenient read: a malformed file degrades to the default and is reported in
/// [`Loaded::corrupt`] with a warning logged. I/O failures are still errors.
pub fn load<T: DeserializeOwned + Default>(path: &Path, format: Format) -> Result<Loaded<T>> {
    match read_raw(path, format)? {
        Ok(value) => Ok(Loaded {
            value,
            corrupt: None,
        }),
        Err(detail) => {
            log::warn!(
                "{} might be corrupt ({}), using an empty default",
                path.display(),
                detail
            );
            Ok(Loaded {
                value: T::default(),
                corrupt: Some(detail),
            })
        }
    }
}

/// Lenient read that drops the corruption report.
pub fn read_or_default<T: DeserializeOwned + Default>(path: &Path, format: Format) -> Result<T> {
    load(path, format).map(|loaded| loaded.value)
}

/// Strict read: a malformed file is a `CorruptState` error.
pub fn read_strict<T: DeserializeOwned + Default>(path: &Path, format: Format) -> Result<T> {
    read_raw(path, format)?.map_err(|detail| AppError::corrupt_state(path, detail))
}

/// Serialize `value` and atomically replace `path` with it.
pub fn write_atomic<T: Serialize>(path: &Path, format: Format, value: &T) -> Result<()> {
    let content = format.encode(value)?;
    write_bytes_atomic(path, content.as_bytes())
}

/// Atomically replace `path` with `bytes`.
///
/// On any failure the temp file is removed and the original file is untouched.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = parent_dir(path);
    if !parent.as_os_str().is_empty() && !parent.exists() {
        fs::create_dir_all(&parent)
            .map_err(|e| AppError::io(format!("Failed to create {}: {}", parent.display(), e)))?;
    }

    let temp_path = temp_path_for(path);
    let result = write_and_rename(&temp_path, path, bytes);
    if result.is_err() && temp_path.exists() {
        if let Err(e) = fs::remove_file(&temp_path) {
            log::warn!("Failed to remove temp file {}: {}", temp_path.display(), e);
        }
    }
    result
}

fn write_and_rename(temp_path: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp_path)
            .map_err(|e| {
                AppError::io(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        file.write_all(bytes).map_err(|e| {
            AppError::io(format!(
                "Failed to write temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
        file.flush().map_err(|e| {
            AppError::io(format!(
                "Failed to flush temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
        file.sync_all().map_err(|e| {
            AppError::io(format!(
                "Failed to sync temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
    }

    fs::rename(temp_path, path).map_err(|e| {
        AppError::io(format!(
            "Failed to rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        ))
    })?;

    log::debug!("Atomically wrote {}", path.display());
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// `<dir>/<file-name>.<uuid>.tmp`, always in the same directory as `path`.
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Copy an unparseable file aside before it gets overwritten.
///
/// The copy is `<file>.corrupt`, or `<file>.corrupt.<uuid>` when an earlier
/// copy already holds that name. Existing copies are never replaced.
pub fn preserve_corrupt(path: &Path) -> Result<PathBuf> {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".corrupt");
    let mut backup = path.with_file_name(&name);
    if backup.exists() {
        name.push(format!(".{}", uuid::Uuid::new_v4().simple()));
        backup = path.with_file_name(name);
    }
    fs::copy(path, &backup).map_err(|e| {
        AppError::io(format!(
            "Failed to preserve corrupt file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(backup)
}
