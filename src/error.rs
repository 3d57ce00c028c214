//! Application error types.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

/// Application error that can be rendered for humans or serialized for `--json` output.
#[derive(Debug)]
pub struct AppError {
    payload: HashMap<String, String>,
    kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Instance not registered
    InstanceNotFound,
    /// Instance directory is gone from disk
    DirectoryMissing,
    /// Name already registered
    NameConflict,
    /// Directory already registered under another name
    DirectoryConflict,
    /// Instance name rejected by validation
    InvalidName,
    /// Path rejected by validation
    InvalidPath,
    /// Sentinel lock is held by another invocation
    LockHeld,
    /// Port search exhausted its attempt budget
    NoAvailablePort,
    /// Requested port is claimed by another instance or busy on the host
    PortOccupied,
    /// Persisted record could not be parsed (strict reads only)
    CorruptState,
    /// Configuration error
    Config,
    /// File system error
    Io,
    /// Container runtime error
    Runtime,
    /// Template materialization error
    Template,
    /// User declined or interrupted the operation
    Cancelled,
    /// General error
    Other,
}

impl ErrorKind {
    pub fn code(&self) -> u32 {
        match self {
            Self::InstanceNotFound => 1001,
            Self::DirectoryMissing => 1002,
            Self::NameConflict => 1003,
            Self::DirectoryConflict => 1004,
            Self::InvalidName => 1005,
            Self::InvalidPath => 1006,
            Self::LockHeld => 2001,
            Self::NoAvailablePort => 2002,
            Self::CorruptState => 2003,
            Self::PortOccupied => 2004,
            Self::Config => 3001,
            Self::Io => 3002,
            Self::Runtime => 4001,
            Self::Template => 4002,
            Self::Cancelled => 5001,
            Self::Other => 9999,
        }
    }
}

impl AppError {
    pub fn new(kind: ErrorKind, payload: HashMap<String, String>) -> Self {
        Self { payload, kind }
    }

    /// Create an error with a single "detail" key from a non-empty string,
    /// or an empty payload if the string is empty.
    fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let payload = if detail.is_empty() {
            HashMap::new()
        } else {
            HashMap::from([("detail".to_string(), detail)])
        };
        Self::new(kind, payload)
    }

    pub fn instance_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::InstanceNotFound,
            HashMap::from([("name".to_string(), name.to_string())]),
        )
    }

    pub fn directory_missing(path: &Path) -> Self {
        Self::new(
            ErrorKind::DirectoryMissing,
            HashMap::from([("path".to_string(), path.display().to_string())]),
        )
    }

    pub fn name_conflict(name: &str, existing_dir: &Path) -> Self {
        Self::new(
            ErrorKind::NameConflict,
            HashMap::from([
                ("name".to_string(), name.to_string()),
                ("directory".to_string(), existing_dir.display().to_string()),
            ]),
        )
    }

    pub fn directory_conflict(dir: &Path, existing_name: &str) -> Self {
        Self::new(
            ErrorKind::DirectoryConflict,
            HashMap::from([
                ("directory".to_string(), dir.display().to_string()),
                ("registered_as".to_string(), existing_name.to_string()),
            ]),
        )
    }

    pub fn invalid_name(name: &str, reason: &str) -> Self {
        Self::new(
            ErrorKind::InvalidName,
            HashMap::from([
                ("name".to_string(), name.to_string()),
                ("reason".to_string(), reason.to_string()),
            ]),
        )
    }

    pub fn invalid_path(path: &Path, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::InvalidPath,
            HashMap::from([
                ("path".to_string(), path.display().to_string()),
                ("reason".to_string(), reason.into()),
            ]),
        )
    }

    pub fn lock_held(sentinel: &Path) -> Self {
        Self::new(
            ErrorKind::LockHeld,
            HashMap::from([("sentinel".to_string(), sentinel.display().to_string())]),
        )
    }

    pub fn no_available_port(lower: u16, upper: u16) -> Self {
        Self::new(
            ErrorKind::NoAvailablePort,
            HashMap::from([
                ("lower".to_string(), lower.to_string()),
                ("upper".to_string(), upper.to_string()),
            ]),
        )
    }

    pub fn port_occupied(port: u16, reason: &str) -> Self {
        Self::new(
            ErrorKind::PortOccupied,
            HashMap::from([
                ("port".to_string(), port.to_string()),
                ("reason".to_string(), reason.to_string()),
            ]),
        )
    }

    pub fn corrupt_state(path: &Path, detail: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::CorruptState,
            HashMap::from([
                ("path".to_string(), path.display().to_string()),
                ("detail".to_string(), detail.into()),
            ]),
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Config, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Io, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Runtime, message)
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Template, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Cancelled, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Other, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn payload(&self, key: &str) -> Option<&str> {
        self.payload.get(key).map(String::as_str)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            let mut pairs: Vec<String> = self
                .payload
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            pairs.sort();
            write!(f, "{:?}: {}", self.kind, pairs.join(", "))
        }
    }
}

impl std::error::Error for AppError {}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct as _;
        let mut s = serializer.serialize_struct("AppError", 3)?;
        s.serialize_field("code", &self.kind.code())?;
        s.serialize_field("kind", &self.kind)?;
        s.serialize_field("payload", &self.payload)?;
        s.end()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<walkdir::Error> for AppError {
    fn from(err: walkdir::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::config(err.to_string())
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;
