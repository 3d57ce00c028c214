#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use stackyard::instance::{CreateOptions, Orchestrator, TemplateSource};
use stackyard::paths::StorageLayout;
use stackyard::port::PortProbe;
use stackyard::registry::Registry;
use stackyard::{AppError, CancellationToken, ContainerRuntime, FixedAnswer, QuietOutput, Result};
use tempfile::TempDir;

/// Records teardown calls and answers `ps` from a fixed list.
#[derive(Default)]
pub struct FakeRuntime {
    pub running: Vec<String>,
    pub fail_queries: bool,
    pub fail_teardown: bool,
    pub torn_down: RefCell<Vec<PathBuf>>,
}

impl ContainerRuntime for FakeRuntime {
    fn running_services(&self, _dir: &Path) -> Result<Vec<String>> {
        if self.fail_queries {
            return Err(AppError::runtime("daemon not reachable"));
        }
        Ok(self.running.clone())
    }

    fn teardown(&self, dir: &Path) -> Result<()> {
        self.torn_down.borrow_mut().push(dir.to_path_buf());
        if self.fail_teardown {
            return Err(AppError::runtime("no such project"));
        }
        Ok(())
    }
}

pub struct Harness {
    pub temp: TempDir,
    pub registry: Registry,
    pub runtime: FakeRuntime,
    pub answer: FixedAnswer,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_runtime(FakeRuntime::default())
    }

    pub fn with_runtime(runtime: FakeRuntime) -> Self {
        let temp = TempDir::new().unwrap();
        let registry = Registry::new(StorageLayout::at(temp.path().join("data")));
        Self {
            temp,
            registry,
            runtime,
            answer: FixedAnswer(true),
            cancel: CancellationToken::new(),
        }
    }

    pub fn sites(&self) -> PathBuf {
        self.temp.path().join("sites")
    }

    pub fn orchestrator<'a, P: PortProbe>(&'a self, probe: &'a P) -> Orchestrator<'a> {
        Orchestrator {
            registry: &self.registry,
            runtime: &self.runtime,
            probe,
            confirm: &self.answer,
            output: &QuietOutput,
            cancel: self.cancel.clone(),
        }
    }

    pub fn options(&self, name: &str) -> CreateOptions {
        CreateOptions {
            name: Some(name.to_string()),
            parent: self.sites(),
            template: TemplateSource::Embedded,
            web_port: None,
            software_version: "6.5".to_string(),
            database_version: "11.4".to_string(),
        }
    }
}

pub fn always_free(_port: u16) -> bool {
    true
}
