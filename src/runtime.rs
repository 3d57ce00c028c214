//! Container runtime collaborator: `docker compose` run inside an instance directory.

use std::path::Path;
use std::process::{Command, Output};

use crate::error::{AppError, Result};

/// Service name fragments that mean the instance's site is up.
const WEB_SERVICE_HINTS: [&str; 4] = ["wordpress", "wp", "web", "app"];

pub trait ContainerRuntime {
    /// Names of the services currently running for the instance in `dir`.
    fn running_services(&self, dir: &Path) -> Result<Vec<String>>;

    /// Stop the instance's containers and remove its volumes.
    fn teardown(&self, dir: &Path) -> Result<()>;
}

/// `true` when any running service looks like the site's web container.
pub fn is_site_running(services: &[String]) -> bool {
    services
        .iter()
        .any(|service| WEB_SERVICE_HINTS.iter().any(|hint| service.contains(hint)))
}

/// Which compose front-end is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFlavor {
    /// `docker compose` plugin
    V2,
    /// standalone `docker-compose`
    V1,
}

#[derive(Debug, Clone, Copy)]
pub struct DockerCompose {
    flavor: ComposeFlavor,
}

impl Default for DockerCompose {
    fn default() -> Self {
        Self {
            flavor: ComposeFlavor::V2,
        }
    }
}

impl DockerCompose {
    /// Prefer the v2 plugin, fall back to v1 when only that answers.
    pub fn detect() -> Self {
        let flavor = match compose_version() {
            Some((flavor, _)) => flavor,
            None => ComposeFlavor::V2,
        };
        Self { flavor }
    }

    fn command(&self, dir: &Path) -> Command {
        let mut cmd = match self.flavor {
            ComposeFlavor::V2 => {
                let mut cmd = Command::new("docker");
                cmd.arg("compose");
                cmd
            }
            ComposeFlavor::V1 => Command::new("docker-compose"),
        };
        cmd.current_dir(dir);
        cmd
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<Output> {
        log::debug!("Running compose {:?} in {}", args, dir.display());
        self.command(dir).args(args).output().map_err(|e| {
            AppError::runtime(format!(
                "Failed to run docker compose in {}: {}",
                dir.display(),
                e
            ))
        })
    }
}

impl ContainerRuntime for DockerCompose {
    fn running_services(&self, dir: &Path) -> Result<Vec<String>> {
        let output = self.run(dir, &["ps", "--services", "--filter", "status=running"])?;
        if !output.status.success() {
            // compose exits non-zero when the project has never been started
            log::debug!(
                "compose ps in {} exited with {}: {}",
                dir.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn teardown(&self, dir: &Path) -> Result<()> {
        let output = self.run(dir, &["down", "--volumes", "--remove-orphans"])?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = stderr.trim();
        let detail = if detail.is_empty() {
            stdout.trim()
        } else {
            detail
        };
        Err(AppError::runtime(format!(
            "docker compose down failed in {}: {}",
            dir.display(),
            detail
        )))
    }
}

/// First line of `docker --version`, `None` when docker is not installed.
pub fn docker_version() -> Option<String> {
    first_line_of(Command::new("docker").arg("--version"))
}

/// Installed compose front-end and its version line.
pub fn compose_version() -> Option<(ComposeFlavor, String)> {
    if let Some(line) = first_line_of(Command::new("docker").args(["compose", "version"])) {
        return Some((ComposeFlavor::V2, line));
    }
    first_line_of(Command::new("docker-compose").arg("version")).map(|line| (ComposeFlavor::V1, line))
}

fn first_line_of(cmd: &mut Command) -> Option<String> {
    let output = cmd.output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}
