//! Command handlers behind the CLI.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;

use crate::cancel::CancellationToken;
use crate::cli::{Cli, Commands, ConfigCommands, MetaCommands};
use crate::config::{self, ConfigKey, GlobalConfig, SetOutcome};
use crate::doctor::{self, Level};
use crate::error::{AppError, Result};
use crate::instance::{find_orphans, CreateOptions, Orchestrator, TemplateSource};
use crate::output::{render_table, CliOutput, QuietOutput, UserOutput};
use crate::paths::{absolutize, shorten_path, StorageLayout};
use crate::port::HostProbe;
use crate::prompt::{Confirm as _, TerminalConfirm};
use crate::registry::{audit, Registry, RegistryMap};
use crate::runtime::DockerCompose;
use crate::store;

const TABLE_PATH_WIDTH: usize = 40;

/// Shared state for one invocation.
pub struct AppContext {
    pub layout: StorageLayout,
    pub registry: Registry,
    pub config: GlobalConfig,
    pub json: bool,
    output: Box<dyn UserOutput>,
    confirm: TerminalConfirm,
}

impl AppContext {
    pub fn new(cli: &Cli) -> Result<Self> {
        let layout = StorageLayout::resolve(cli.data_dir.as_deref())?;
        let loaded = config::load_config_checked(&layout)?;
        let config = loaded.value;
        let output: Box<dyn UserOutput> = if cli.json {
            Box::new(QuietOutput)
        } else {
            Box::new(CliOutput::new(config.theme))
        };
        if let Some(detail) = &loaded.corrupt {
            output.warning(&format!(
                "{} could not be parsed ({}); using defaults. A copy is kept before the next change.",
                layout.config_path().display(),
                detail
            ));
        }
        Ok(Self {
            registry: Registry::new(layout.clone()),
            layout,
            config,
            json: cli.json,
            output,
            confirm: TerminalConfirm::new(cli.yes),
        })
    }

    fn out(&self) -> &dyn UserOutput {
        self.output.as_ref()
    }

    fn confirm(&self, question: &str) -> bool {
        self.confirm.confirm(question)
    }

    fn require_confirmation(&self, question: &str) -> Result<()> {
        if self.confirm(question) {
            Ok(())
        } else {
            Err(AppError::cancelled("declined"))
        }
    }

    /// Print `value` as JSON when `--json` is set. Returns whether it did.
    fn emit_json<T: Serialize>(&self, value: &T) -> Result<bool> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(self.json)
    }

    /// Directory new instances and orphan scans default to.
    fn base_directory(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit.or(self.config.sites_base_directory.as_deref()) {
            Some(dir) => absolutize(dir),
            None => std::env::current_dir()
                .map_err(|e| AppError::io(format!("Failed to get current directory: {}", e))),
        }
    }

    fn orchestrator<'a>(
        &'a self,
        runtime: &'a DockerCompose,
        cancel: CancellationToken,
    ) -> Orchestrator<'a> {
        Orchestrator {
            registry: &self.registry,
            runtime,
            probe: &HostProbe,
            confirm: &self.confirm,
            output: self.out(),
            cancel,
        }
    }
}

/// Run one parsed command line and report the outcome.
pub fn dispatch(cli: Cli) -> ExitCode {
    let ctx = match AppContext::new(&cli) {
        Ok(ctx) => ctx,
        Err(e) => return report_error(cli.json, &CliOutput::new(Default::default()), &e),
    };
    match execute(&ctx, cli.command) {
        Ok(code) => code,
        Err(e) => report_error(ctx.json, ctx.out(), &e),
    }
}

fn report_error(json: bool, output: &dyn UserOutput, err: &AppError) -> ExitCode {
    log::debug!("Command failed: {:?}", err);
    if json {
        match serde_json::to_string_pretty(&serde_json::json!({ "error": err })) {
            Ok(text) => println!("{}", text),
            Err(_) => eprintln!("{}", err),
        }
    } else {
        output.error(&err.to_string());
    }
    ExitCode::FAILURE
}

fn execute(ctx: &AppContext, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Create {
            name,
            parent,
            template,
            web_port,
            software_version,
            db_version,
        } => {
            let options = CreateOptions {
                name,
                parent: ctx.base_directory(parent.as_deref())?,
                template: match template {
                    Some(dir) => TemplateSource::Directory(absolutize(&dir)?),
                    None => TemplateSource::Embedded,
                },
                web_port,
                software_version,
                database_version: db_version,
            };
            create(ctx, options)?;
        }
        Commands::Delete { name } => delete(ctx, &name)?,
        Commands::List => list(ctx)?,
        Commands::Status => status(ctx)?,
        Commands::Register { path, name } => register(ctx, &path, name.as_deref())?,
        Commands::Unregister { name } => unregister(ctx, &name)?,
        Commands::Prune => prune(ctx)?,
        Commands::Locate { name } => {
            let directory = ctx.registry.locate(&name)?;
            if !ctx.emit_json(&directory)? {
                ctx.out().plain(&directory.display().to_string());
            }
        }
        Commands::Ports => ports(ctx)?,
        Commands::Orphans { dir, adopt, discard } => {
            orphans(ctx, dir.as_deref(), adopt, discard)?;
        }
        Commands::Versions { name, software, db } => {
            versions(ctx, &name, software.as_deref(), db.as_deref())?;
        }
        Commands::Config(command) => config_command(ctx, command)?,
        Commands::Meta(command) => meta_command(ctx, command)?,
        Commands::Doctor => return doctor(ctx),
    }
    Ok(ExitCode::SUCCESS)
}

fn create(ctx: &AppContext, options: CreateOptions) -> Result<()> {
    let runtime = DockerCompose::detect();
    let orchestrator = ctx.orchestrator(&runtime, CancellationToken::from_ctrlc());
    let mut rng = rand::thread_rng();
    let created = orchestrator.create(options, &mut rng)?;

    if ctx.emit_json(&created)? {
        return Ok(());
    }
    let out = ctx.out();
    out.success(&format!("Instance '{}' created", created.name));
    out.plain(&format!("  Directory: {}", created.record.directory.display()));
    for (service, port) in &created.ports {
        out.plain(&format!("  {:<10} {}", service, port));
    }
    if let Some(port) = created.record.assigned_port {
        out.plain(&format!("  URL:       http://localhost:{}", port));
    }
    out.status(&format!(
        "Start it with 'docker compose up -d' in {}",
        created.record.directory.display()
    ));
    Ok(())
}

fn delete(ctx: &AppContext, name: &str) -> Result<()> {
    let record = ctx.registry.get(name)?;
    ctx.require_confirmation(&format!(
        "Delete instance '{}' at {} including its containers, volumes and files?",
        name,
        record.directory.display()
    ))?;

    let runtime = DockerCompose::detect();
    let report = ctx
        .orchestrator(&runtime, CancellationToken::new())
        .delete(name)?;

    if !ctx.emit_json(&report)? {
        ctx.out()
            .success(&format!("Instance '{}' removed from the registry", name));
    }
    Ok(())
}

fn list(ctx: &AppContext) -> Result<()> {
    let map = load_with_warning(ctx)?;
    if ctx.emit_json(&map)? {
        return Ok(());
    }
    if map.is_empty() {
        ctx.out().status("No instances registered.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = map
        .iter()
        .map(|(name, record)| {
            vec![
                name.clone(),
                record
                    .assigned_port
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                record.creation_timestamp.clone(),
                record.software_version.clone(),
                record.database_version.clone(),
                record.status.to_string(),
                shorten_path(&record.directory, TABLE_PATH_WIDTH),
            ]
        })
        .collect();
    let headers = ["NAME", "PORT", "CREATED", "VERSION", "DB", "STATUS", "DIRECTORY"];
    for line in render_table(&headers, &rows) {
        ctx.out().plain(&line);
    }
    Ok(())
}

fn status(ctx: &AppContext) -> Result<()> {
    let runtime = DockerCompose::detect();
    let changes = ctx
        .orchestrator(&runtime, CancellationToken::new())
        .refresh_statuses()?;

    if ctx.emit_json(&changes)? {
        return Ok(());
    }
    if changes.is_empty() {
        ctx.out().success("All statuses are up to date.");
    } else {
        for change in &changes {
            ctx.out()
                .plain(&format!("  {}: {} -> {}", change.name, change.from, change.to));
        }
        ctx.out()
            .success(&format!("Updated {} instance(s).", changes.len()));
    }
    Ok(())
}

fn register(ctx: &AppContext, path: &Path, name: Option<&str>) -> Result<()> {
    let runtime = DockerCompose::default();
    let registered = ctx
        .orchestrator(&runtime, CancellationToken::new())
        .register_existing(path, name)?;

    if ctx.emit_json(&registered)? {
        return Ok(());
    }
    for replaced in &registered.replaced {
        ctx.out()
            .warning(&format!("Replaced existing entry '{}'", replaced));
    }
    ctx.out().success(&format!(
        "Registered '{}' at {}",
        registered.name,
        registered.record.directory.display()
    ));
    Ok(())
}

fn unregister(ctx: &AppContext, name: &str) -> Result<()> {
    let record = ctx.registry.get(name)?;
    ctx.require_confirmation(&format!(
        "Remove '{}' from the registry? Files in {} are kept.",
        name,
        record.directory.display()
    ))?;
    let removed = ctx.registry.unregister(name)?;

    if !ctx.emit_json(&removed)? {
        ctx.out().success(&format!("Unregistered '{}'", name));
    }
    Ok(())
}

fn prune(ctx: &AppContext) -> Result<()> {
    let runtime = DockerCompose::default();
    let removed = ctx
        .orchestrator(&runtime, CancellationToken::new())
        .prune()?;

    if !ctx.emit_json(&removed)? && !removed.is_empty() {
        ctx.out().success(&format!(
            "Removed {} registry entr{}: {}",
            removed.len(),
            if removed.len() == 1 { "y" } else { "ies" },
            removed.join(", ")
        ));
    }
    Ok(())
}

#[derive(Serialize)]
struct PortsReport {
    ports: BTreeMap<String, Option<u16>>,
    duplicates: BTreeMap<u16, Vec<String>>,
}

fn ports(ctx: &AppContext) -> Result<()> {
    let map = load_with_warning(ctx)?;
    let findings = audit(&map);
    let report = PortsReport {
        ports: map
            .iter()
            .map(|(name, record)| (name.clone(), record.assigned_port))
            .collect(),
        duplicates: findings.duplicate_ports,
    };
    if ctx.emit_json(&report)? {
        return Ok(());
    }

    let rows: Vec<Vec<String>> = map
        .iter()
        .map(|(name, record)| {
            let port = record.assigned_port;
            let flag = match port {
                Some(p) if report.duplicates.contains_key(&p) => "DUPLICATE",
                _ => "",
            };
            vec![
                name.clone(),
                port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                flag.to_string(),
            ]
        })
        .collect();
    for line in render_table(&["NAME", "PORT", ""], &rows) {
        ctx.out().plain(&line);
    }
    for (port, names) in &report.duplicates {
        ctx.out()
            .warning(&format!("Port {} is assigned to {}", port, names.join(", ")));
    }
    Ok(())
}

fn orphans(ctx: &AppContext, dir: Option<&Path>, adopt: bool, discard: bool) -> Result<()> {
    let base = ctx.base_directory(dir)?;
    let found = find_orphans(&base, &ctx.registry.list()?)?;

    if !adopt && !discard {
        if ctx.emit_json(&found)? {
            return Ok(());
        }
        if found.is_empty() {
            ctx.out()
                .success(&format!("No orphaned instances under {}", base.display()));
        }
        for orphan in &found {
            ctx.out().plain(&format!(
                "  {}  ({})",
                orphan.name(),
                orphan.directory.display()
            ));
        }
        return Ok(());
    }

    let runtime = DockerCompose::detect();
    let orchestrator = ctx.orchestrator(&runtime, CancellationToken::new());
    let mut handled = Vec::new();
    for orphan in &found {
        if adopt {
            match orchestrator.adopt(orphan) {
                Ok(name) => {
                    ctx.out().success(&format!("Adopted '{}'", name));
                    handled.push(name);
                }
                Err(e) => ctx
                    .out()
                    .warning(&format!("Could not adopt {}: {}", orphan.directory.display(), e)),
            }
        } else if ctx.confirm(&format!(
            "Delete orphaned directory {}?",
            orphan.directory.display()
        )) {
            orchestrator.discard(orphan)?;
            ctx.out()
                .success(&format!("Deleted {}", orphan.directory.display()));
            handled.push(orphan.name());
        }
    }
    ctx.emit_json(&handled)?;
    Ok(())
}

fn versions(
    ctx: &AppContext,
    name: &str,
    software: Option<&str>,
    db: Option<&str>,
) -> Result<()> {
    if software.is_none() && db.is_none() {
        return Err(AppError::config("Pass --software and/or --db"));
    }
    let record = ctx.registry.record_versions(name, software, db)?;
    if !ctx.emit_json(&record)? {
        ctx.out().success(&format!(
            "'{}': software {}, database {}",
            name, record.software_version, record.database_version
        ));
    }
    Ok(())
}

fn config_command(ctx: &AppContext, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            if ctx.emit_json(&ctx.config)? {
                return Ok(());
            }
            ctx.out()
                .plain(&format!("# {}", ctx.layout.config_path().display()));
            for key in ConfigKey::ALL {
                let value = config::get_value(&ctx.config, key)
                    .unwrap_or_else(|| "(not set)".to_string());
                ctx.out().plain(&format!("{} = {}", key.as_str(), value));
            }
        }
        ConfigCommands::Get { key } => {
            let key: ConfigKey = key.parse()?;
            let value = config::get_value(&ctx.config, key);
            if !ctx.emit_json(&value)? {
                ctx.out()
                    .plain(value.as_deref().unwrap_or("(not set)"));
            }
        }
        ConfigCommands::Set { key, value } => {
            let key: ConfigKey = key.parse()?;
            match config::set_value(&ctx.layout, key, &value)? {
                SetOutcome::Changed(v) => ctx.out().success(&format!("{} = {}", key.as_str(), v)),
                SetOutcome::Unchanged(v) => ctx
                    .out()
                    .status(&format!("{} is already {}", key.as_str(), v)),
                SetOutcome::ChangedPending(v) => {
                    ctx.out().success(&format!("{} = {}", key.as_str(), v));
                    ctx.out()
                        .warning(&format!("{} does not exist yet; it will be created on first use", v));
                }
            }
        }
        ConfigCommands::Unset { key } => {
            let key: ConfigKey = key.parse()?;
            if config::unset_value(&ctx.layout, key)? {
                ctx.out().success(&format!("{} reset to default", key.as_str()));
            } else {
                ctx.out().status(&format!("{} was not set", key.as_str()));
            }
        }
    }
    Ok(())
}

fn meta_command(ctx: &AppContext, command: MetaCommands) -> Result<()> {
    match command {
        MetaCommands::Show => {
            let map = load_with_warning(ctx)?;
            // Raw record either way; there is no prettier view of it.
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        MetaCommands::Path => {
            let path = ctx.registry.path();
            if !ctx.emit_json(&path)? {
                ctx.out().plain(&path.display().to_string());
            }
        }
        MetaCommands::Validate => validate(ctx)?,
        MetaCommands::Edit => edit(ctx)?,
        MetaCommands::Unlock => {
            let sentinel = ctx.layout.sentinel_path();
            let Some(age) = store::held_for(&sentinel) else {
                ctx.out().status("No registry lock is present.");
                return Ok(());
            };
            ctx.require_confirmation(&format!(
                "Remove lock {} (held for {}s)? Only do this if no other stackyard command is running.",
                sentinel.display(),
                age.as_secs()
            ))?;
            store::unlock(&sentinel)?;
            ctx.out().success("Registry lock removed.");
        }
    }
    Ok(())
}

fn validate(ctx: &AppContext) -> Result<()> {
    let map = ctx.registry.list_strict()?;
    let findings = audit(&map);
    if ctx.emit_json(&findings)? {
        return Ok(());
    }
    for (port, names) in &findings.duplicate_ports {
        ctx.out()
            .warning(&format!("Port {} is assigned to {}", port, names.join(", ")));
    }
    for (directory, names) in &findings.duplicate_directories {
        ctx.out().warning(&format!(
            "{} is registered as {}",
            directory.display(),
            names.join(", ")
        ));
    }
    for name in &findings.missing_directories {
        ctx.out()
            .warning(&format!("Directory for '{}' is missing", name));
    }
    if findings.is_clean() {
        ctx.out()
            .success(&format!("Registry is valid ({} instance(s)).", map.len()));
    }
    Ok(())
}

fn edit(ctx: &AppContext) -> Result<()> {
    let editor = find_editor()
        .ok_or_else(|| AppError::config("No editor found, set $EDITOR"))?;
    let path = ctx.registry.path();
    ctx.require_confirmation(&format!(
        "Open {} in {}? A broken edit makes the registry unreadable.",
        path.display(),
        editor
    ))?;

    ctx.layout.ensure()?;
    store::with_lock(&ctx.layout.sentinel_path(), || {
        if !path.exists() {
            store::write_atomic(&path, store::Format::Json, &RegistryMap::new())?;
        }
        let status = std::process::Command::new(&editor)
            .arg(&path)
            .status()
            .map_err(|e| AppError::other(format!("Failed to launch {}: {}", editor, e)))?;
        if !status.success() {
            ctx.out()
                .warning(&format!("{} exited with {}", editor, status));
        }
        Ok(())
    })?;
    validate(ctx)
}

fn find_editor() -> Option<String> {
    for var in ["VISUAL", "EDITOR"] {
        if let Some(value) = std::env::var(var).ok().filter(|v| !v.trim().is_empty()) {
            return Some(value);
        }
    }
    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &["notepad"]
    } else {
        &["nano", "vim", "vi"]
    };
    candidates
        .iter()
        .find(|name| {
            std::process::Command::new("which")
                .arg(name)
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        })
        .map(|name| name.to_string())
}

fn doctor(ctx: &AppContext) -> Result<ExitCode> {
    let report = doctor::run(&ctx.registry, true);
    if !ctx.emit_json(&report)? {
        for check in &report.checks {
            let line = format!("{:<12} {}", check.name, check.detail);
            match check.level {
                Level::Ok => ctx.out().success(&line),
                Level::Warning => ctx.out().warning(&line),
                Level::Critical => ctx.out().error(&line),
            }
        }
        ctx.out().plain(&format!(
            "{} critical issue(s), {} warning(s)",
            report.critical_count(),
            report.warning_count()
        ));
    }
    Ok(if report.critical_count() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Lenient registry read that tells the user when the file was unreadable.
fn load_with_warning(ctx: &AppContext) -> Result<RegistryMap> {
    let loaded = ctx.registry.load()?;
    if let Some(detail) = &loaded.corrupt {
        ctx.out().warning(&format!(
            "{} could not be parsed ({}); showing an empty registry. Run 'stackyard meta validate'.",
            ctx.registry.path().display(),
            detail
        ));
    }
    Ok(loaded.value)
}
