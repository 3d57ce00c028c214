//! Instance file materialization from a template directory or the built-in default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;
use walkdir::WalkDir;

use crate::envfile;
use crate::error::{AppError, Result};
use crate::paths::MARKER_FILE_NAME;
use crate::port::PortPlan;
use crate::store;

/// Template file that becomes `.env` after substitution.
pub const ENV_TEMPLATE_FILE: &str = "env-template";

const DEFAULT_COMPOSE: &str = include_str!("../../templates/default/docker-compose.yml");
const DEFAULT_ENV_TEMPLATE: &str = include_str!("../../templates/default/env-template");

const SALT_KEYS: [&str; 8] = [
    "AUTH_KEY",
    "SECURE_AUTH_KEY",
    "LOGGED_IN_KEY",
    "NONCE_KEY",
    "AUTH_SALT",
    "SECURE_AUTH_SALT",
    "LOGGED_IN_SALT",
    "NONCE_SALT",
];

/// `.env` key for each port the default plan allocates.
const PORT_KEYS: [(&str, &str); 4] = [
    ("web", "WEB_PORT"),
    ("mail_smtp", "MAIL_SMTP_PORT"),
    ("mail_web", "MAIL_WEB_PORT"),
    ("db_admin", "DB_ADMIN_PORT"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Compose file and env template compiled into the binary.
    Embedded,
    /// A user directory copied recursively.
    Directory(PathBuf),
}

pub fn random_secret<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Values substituted into the env template for a new instance.
pub fn instance_values<R: Rng + ?Sized>(
    name: &str,
    ports: &PortPlan,
    software_version: &str,
    database_version: &str,
    rng: &mut R,
) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    values.insert("INSTANCE_NAME".to_string(), name.to_string());
    values.insert("SOFTWARE_VERSION".to_string(), software_version.to_string());
    values.insert("DB_VERSION".to_string(), database_version.to_string());

    for (service, key) in PORT_KEYS {
        if let Some(port) = ports.get(service) {
            values.insert(key.to_string(), port.to_string());
        }
    }
    if let Some(port) = ports.get(crate::port::WEB_SERVICE) {
        values.insert("WEB_URL".to_string(), format!("http://localhost:{}", port));
    }

    let db_name = format!("db_{}", name.replace(|c: char| !c.is_ascii_alphanumeric(), "_"));
    values.insert("DB_NAME".to_string(), db_name);
    values.insert("DB_USER".to_string(), format!("user_{}", random_secret(rng, 6)));
    values.insert("DB_PASSWORD".to_string(), random_secret(rng, 16));
    values.insert("DB_ROOT_PASSWORD".to_string(), random_secret(rng, 16));
    for key in SALT_KEYS {
        values.insert(key.to_string(), random_secret(rng, 64));
    }
    values
}

/// Lay the template out in `dest` and turn its env template into `.env`.
///
/// `dest` must already exist. Returns the keys the env template had no line for.
pub fn materialize(
    source: &TemplateSource,
    dest: &Path,
    values: &BTreeMap<String, String>,
) -> Result<Vec<String>> {
    match source {
        TemplateSource::Embedded => {
            store::write_bytes_atomic(&dest.join("docker-compose.yml"), DEFAULT_COMPOSE.as_bytes())?;
            store::write_bytes_atomic(
                &dest.join(ENV_TEMPLATE_FILE),
                DEFAULT_ENV_TEMPLATE.as_bytes(),
            )?;
        }
        TemplateSource::Directory(dir) => copy_template_dir(dir, dest)?,
    }

    let template_path = dest.join(ENV_TEMPLATE_FILE);
    let template = std::fs::read_to_string(&template_path).map_err(|e| {
        AppError::template(format!(
            "Template has no readable {}: {}",
            ENV_TEMPLATE_FILE, e
        ))
    })?;
    let (env, missing) = envfile::substitute(&template, values);
    store::write_bytes_atomic(&dest.join(".env"), env.as_bytes())?;
    std::fs::remove_file(&template_path).map_err(|e| {
        AppError::io(format!("Failed to remove {}: {}", template_path.display(), e))
    })?;

    for key in &missing {
        log::warn!("Template has no '{}=' line, value not written", key);
    }
    Ok(missing)
}

fn copy_template_dir(src: &Path, dest: &Path) -> Result<()> {
    if !src.is_dir() {
        return Err(AppError::template(format!(
            "Template directory {} does not exist",
            src.display()
        )));
    }
    if !src.join(ENV_TEMPLATE_FILE).is_file() {
        return Err(AppError::template(format!(
            "Template directory {} has no {}",
            src.display(),
            ENV_TEMPLATE_FILE
        )));
    }

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let path = entry.path();
        let relative = path
            .strip_prefix(src)
            .map_err(|e| AppError::template(e.to_string()))?;
        if relative.as_os_str() == MARKER_FILE_NAME {
            continue;
        }
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| {
                AppError::io(format!("Failed to create {}: {}", target.display(), e))
            })?;
        } else if entry.file_type().is_file() {
            std::fs::copy(path, &target).map_err(|e| {
                AppError::io(format!(
                    "Failed to copy {} to {}: {}",
                    path.display(),
                    target.display(),
                    e
                ))
            })?;
        } else {
            log::debug!("Skipping non-regular template entry {}", path.display());
        }
    }
    Ok(())
}
