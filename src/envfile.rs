//! Minimal `.env` handling: `KEY=VALUE` lines, `#` comments, optional quotes.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{AppError, Result};

pub fn parse(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

pub fn read(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(parse(&content))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Replace the value of every `KEY=` line whose key is in `values`. Other
/// lines, comments and ordering are kept. Returns the rewritten text and the
/// keys that had no line to substitute.
pub fn substitute(content: &str, values: &BTreeMap<String, String>) -> (String, Vec<String>) {
    let mut seen = Vec::new();
    let mut out = String::with_capacity(content.len());

    for line in content.lines() {
        let key = line
            .split_once('=')
            .map(|(key, _)| key.trim())
            .filter(|key| !key.starts_with('#'));
        match key.and_then(|key| values.get_key_value(key)) {
            Some((key, value)) => {
                out.push_str(&format!("{}={}", key, value));
                seen.push(key.clone());
            }
            None => out.push_str(line),
        }
        out.push('\n');
    }

    let missing = values
        .keys()
        .filter(|key| !seen.contains(key))
        .cloned()
        .collect();
    (out, missing)
}
