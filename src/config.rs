use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::paths::{expand_path, sentinel_for, StorageLayout};
use crate::store::{self, Format, Loaded};

/// Process-wide preferences. A missing file means "use defaults".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sites_base_directory: Option<PathBuf>,
    #[serde(default)]
    pub theme: Theme,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dark => write!(f, "dark"),
            Self::Light => write!(f, "light"),
        }
    }
}

impl FromStr for Theme {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Self::Dark),
            "light" => Ok(Self::Light),
            other => Err(AppError::config(format!(
                "Unknown theme '{}', expected dark or light",
                other
            ))),
        }
    }
}

/// Addressable configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    SitesBaseDirectory,
    Theme,
}

impl ConfigKey {
    pub const ALL: [Self; 2] = [Self::SitesBaseDirectory, Self::Theme];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SitesBaseDirectory => "sites_base_directory",
            Self::Theme => "theme",
        }
    }
}

impl FromStr for ConfigKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == key)
            .ok_or_else(|| AppError::config(format!("Unknown configuration key '{}'", s)))
    }
}

/// Read the global config leniently: missing or corrupt files yield defaults.
pub fn load_config(layout: &StorageLayout) -> Result<GlobalConfig> {
    store::read_or_default(&layout.config_path(), Format::Toml)
}

/// Lenient read that keeps the parse error so the caller can tell the user.
pub fn load_config_checked(layout: &StorageLayout) -> Result<Loaded<GlobalConfig>> {
    store::load(&layout.config_path(), Format::Toml)
}

/// Execute a read-modify-write operation on the config file while holding its sentinel.
/// The file is created lazily by the first write and left alone when nothing changed.
/// A config file that failed to parse is copied aside before it is replaced.
pub fn with_config_mut<F, T>(layout: &StorageLayout, f: F) -> Result<T>
where
    F: FnOnce(&mut GlobalConfig) -> Result<T>,
{
    layout.ensure()?;
    let path = layout.config_path();
    store::with_lock(&sentinel_for(&path), || {
        let Loaded { value, corrupt } = store::load::<GlobalConfig>(&path, Format::Toml)?;
        let mut config = value.clone();
        let result = f(&mut config)?;
        if config == value {
            return Ok(result);
        }
        if corrupt.is_some() {
            let backup = store::preserve_corrupt(&path)?;
            log::warn!(
                "Config {} was unreadable, previous contents saved to {}",
                path.display(),
                backup.display()
            );
        }
        store::write_atomic(&path, Format::Toml, &config)?;
        Ok(result)
    })
}

/// Render a single key for `config get`. `None` means the key is unset.
pub fn get_value(config: &GlobalConfig, key: ConfigKey) -> Option<String> {
    match key {
        ConfigKey::SitesBaseDirectory => config
            .sites_base_directory
            .as_ref()
            .map(|p| p.display().to_string()),
        ConfigKey::Theme => Some(config.theme.to_string()),
    }
}

/// Outcome of `config set`, used for user feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    Changed(String),
    Unchanged(String),
    /// The directory does not exist yet; it will be created on first use.
    ChangedPending(String),
}

/// Validate and store a value for `key`.
pub fn set_value(layout: &StorageLayout, key: ConfigKey, raw: &str) -> Result<SetOutcome> {
    match key {
        ConfigKey::SitesBaseDirectory => {
            let resolved = expand_path(raw)?;
            let exists = match std::fs::metadata(&resolved) {
                Ok(meta) if meta.is_dir() => true,
                Ok(_) => {
                    return Err(AppError::invalid_path(
                        &resolved,
                        "exists but is not a directory",
                    ))
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => return Err(AppError::invalid_path(&resolved, e.to_string())),
            };
            let display = resolved.display().to_string();
            with_config_mut(layout, move |config| {
                if config.sites_base_directory.as_ref() == Some(&resolved) {
                    return Ok(SetOutcome::Unchanged(display));
                }
                config.sites_base_directory = Some(resolved);
                Ok(if exists {
                    SetOutcome::Changed(display)
                } else {
                    SetOutcome::ChangedPending(display)
                })
            })
        }
        ConfigKey::Theme => {
            let theme: Theme = raw.parse()?;
            with_config_mut(layout, move |config| {
                if config.theme == theme {
                    return Ok(SetOutcome::Unchanged(theme.to_string()));
                }
                config.theme = theme;
                Ok(SetOutcome::Changed(theme.to_string()))
            })
        }
    }
}

/// Reset `key` to its default. Returns `false` when nothing changed.
pub fn unset_value(layout: &StorageLayout, key: ConfigKey) -> Result<bool> {
    with_config_mut(layout, move |config| {
        let before = config.clone();
        match key {
            ConfigKey::SitesBaseDirectory => config.sites_base_directory = None,
            ConfigKey::Theme => config.theme = Theme::default(),
        }
        Ok(*config != before)
    })
}
