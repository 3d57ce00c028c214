use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Serialize;

use super::journal::CreationJournal;
use super::template::{self, TemplateSource};
use super::Orchestrator;
use crate::error::{AppError, Result};
use crate::port::{
    allocate_plan, check_port_available, claimed_ports, PortPlan, DEFAULT_PLAN, WEB_SERVICE,
};
use crate::registry::{
    find_by_directory, write_marker, InstanceMarker, InstanceRecord, InstanceStatus, RegistryMap,
};
use crate::validation::{random_instance_name, validate_instance_name};

const RANDOM_NAME_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Random `adjective-noun` when `None`.
    pub name: Option<String>,
    /// Directory the instance directory is created in.
    pub parent: PathBuf,
    pub template: TemplateSource,
    /// Fixed web port instead of a random one.
    pub web_port: Option<u16>,
    pub software_version: String,
    pub database_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedInstance {
    pub name: String,
    pub record: InstanceRecord,
    pub ports: PortPlan,
}

impl Orchestrator<'_> {
    /// Create a new instance: allocate ports, lay out files, write the marker,
    /// then register. Any failure or interruption removes what was created.
    pub fn create<R: Rng + ?Sized>(
        &self,
        options: CreateOptions,
        rng: &mut R,
    ) -> Result<CreatedInstance> {
        let map = self.registry.list()?;
        let name = match options.name {
            Some(name) => name,
            None => self.pick_random_name(&options.parent, &map, rng)?,
        };
        validate_instance_name(&name)?;

        let directory = options.parent.join(&name);
        if let Some(existing) = map.get(&name) {
            return Err(AppError::name_conflict(&name, &existing.directory));
        }
        if directory.exists() {
            return Err(AppError::invalid_path(&directory, "already exists"));
        }
        if let Some(other) = find_by_directory(&map, &directory) {
            return Err(AppError::directory_conflict(&directory, other));
        }
        self.cancel.check()?;

        self.output.status("Allocating ports...");
        let mut claimed = claimed_ports(&map);
        let ports = match options.web_port {
            Some(port) => {
                if claimed.contains(&port) {
                    return Err(AppError::port_occupied(port, "assigned to another instance"));
                }
                check_port_available(port, self.probe)?;
                claimed.insert(port);
                let mut ports = allocate_plan(&DEFAULT_PLAN[1..], &mut claimed, self.probe, rng)?;
                ports.insert(WEB_SERVICE.to_string(), port);
                ports
            }
            None => allocate_plan(&DEFAULT_PLAN, &mut claimed, self.probe, rng)?,
        };
        log::info!("Ports for {}: {:?}", name, ports);

        let mut record = InstanceRecord::new(directory.clone(), ports.get(WEB_SERVICE).copied());
        record.software_version = options.software_version.clone();
        record.database_version = options.database_version.clone();
        record.status = InstanceStatus::Stopped;

        let values = template::instance_values(
            &name,
            &ports,
            &options.software_version,
            &options.database_version,
            rng,
        );

        let mut journal = CreationJournal::new();
        let result = journal.create_instance_dir(&directory).and_then(|()| {
            self.cancel.check()?;
            self.output.status("Writing instance files...");
            for key in template::materialize(&options.template, &directory, &values)? {
                self.output
                    .warning(&format!("Template has no '{}=' line; value not set", key));
            }
            self.cancel.check()?;
            write_marker(
                &directory,
                &InstanceMarker::from_record(&name, &record, ports.clone()),
            )?;
            self.cancel.check()?;
            self.registry.register(&name, record.clone(), &[])?;
            Ok(())
        });

        if let Err(e) = result {
            self.output.warning(&format!("Creation failed, rolling back: {}", e));
            for problem in journal.rollback() {
                self.output
                    .warning(&format!("Rollback could not remove {}", problem));
            }
            return Err(e);
        }

        Ok(CreatedInstance {
            name,
            record,
            ports,
        })
    }

    fn pick_random_name<R: Rng + ?Sized>(
        &self,
        parent: &Path,
        map: &RegistryMap,
        rng: &mut R,
    ) -> Result<String> {
        for _ in 0..RANDOM_NAME_ATTEMPTS {
            let candidate = random_instance_name(rng);
            if !map.contains_key(&candidate) && !parent.join(&candidate).exists() {
                return Ok(candidate);
            }
        }
        Err(AppError::other(
            "Could not find a free random name, pass one explicitly",
        ))
    }
}
