//! Environment and registry health checks.

use std::time::Duration;

use serde::Serialize;

use crate::registry::{audit, Registry};
use crate::runtime::{compose_version, docker_version, ComposeFlavor};
use crate::store;

/// Sentinels older than this are most likely left over from a crashed run.
const STALE_LOCK_AGE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Ok,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub level: Level,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DoctorReport {
    pub checks: Vec<Check>,
}

impl DoctorReport {
    fn push(&mut self, name: &'static str, level: Level, detail: impl Into<String>) {
        self.checks.push(Check {
            name,
            level,
            detail: detail.into(),
        });
    }

    pub fn critical_count(&self) -> usize {
        self.count(Level::Critical)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Level::Warning)
    }

    fn count(&self, level: Level) -> usize {
        self.checks.iter().filter(|c| c.level == level).count()
    }
}

/// Run every check. Host tool checks shell out to docker.
pub fn run(registry: &Registry, check_tools: bool) -> DoctorReport {
    let mut report = DoctorReport::default();
    if check_tools {
        check_tools_installed(&mut report);
    }
    check_storage(registry, &mut report);
    check_registry(registry, &mut report);
    report
}

fn check_tools_installed(report: &mut DoctorReport) {
    match docker_version() {
        Some(version) => report.push("docker", Level::Ok, version),
        None => report.push("docker", Level::Critical, "docker was not found on PATH"),
    }
    match compose_version() {
        Some((ComposeFlavor::V2, version)) => report.push("compose", Level::Ok, version),
        Some((ComposeFlavor::V1, version)) => report.push(
            "compose",
            Level::Warning,
            format!("{} (standalone v1, consider the v2 plugin)", version),
        ),
        None => report.push(
            "compose",
            Level::Critical,
            "neither 'docker compose' nor 'docker-compose' works",
        ),
    }
}

fn check_storage(registry: &Registry, report: &mut DoctorReport) {
    let layout = registry.layout();
    let probe = layout.root().join(".doctor-write-test");
    let writable = layout
        .ensure()
        .and_then(|()| store::write_bytes_atomic(&probe, b"ok"));
    match writable {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(&probe) {
                log::warn!("Failed to remove {}: {}", probe.display(), e);
            }
            report.push("storage", Level::Ok, layout.root().display().to_string());
        }
        Err(e) => report.push(
            "storage",
            Level::Critical,
            format!("{} is not writable: {}", layout.root().display(), e),
        ),
    }

    let sentinel = layout.sentinel_path();
    match store::held_for(&sentinel) {
        None => report.push("lock", Level::Ok, "not held"),
        Some(age) if age >= STALE_LOCK_AGE => report.push(
            "lock",
            Level::Warning,
            format!(
                "{} is {} minutes old; remove it with 'stackyard meta unlock' if no other run is active",
                sentinel.display(),
                age.as_secs() / 60
            ),
        ),
        Some(_) => report.push("lock", Level::Ok, "held by a running invocation"),
    }
}

fn check_registry(registry: &Registry, report: &mut DoctorReport) {
    let map = match registry.list_strict() {
        Ok(map) => map,
        Err(e) => {
            report.push("registry", Level::Critical, e.to_string());
            return;
        }
    };
    report.push(
        "registry",
        Level::Ok,
        format!("{} instance(s) registered", map.len()),
    );

    let findings = audit(&map);
    for (port, names) in &findings.duplicate_ports {
        report.push(
            "ports",
            Level::Warning,
            format!("port {} is assigned to {}", port, names.join(", ")),
        );
    }
    for (directory, names) in &findings.duplicate_directories {
        report.push(
            "directories",
            Level::Warning,
            format!("{} is registered as {}", directory.display(), names.join(", ")),
        );
    }
    if !findings.missing_directories.is_empty() {
        report.push(
            "directories",
            Level::Warning,
            format!(
                "missing on disk: {} (see 'stackyard prune')",
                findings.missing_directories.join(", ")
            ),
        );
    }
}
