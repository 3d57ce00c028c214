use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::paths::DATA_DIR_ENV;

#[derive(Parser, Debug)]
#[command(name = "stackyard", version)]
#[command(about = "Create, track and clean up disposable local development instances")]
pub struct Cli {
    /// Directory holding the registry and config (overrides the per-user default)
    #[arg(long, global = true, env = DATA_DIR_ENV, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Machine-readable output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new instance from a template and register it
    Create {
        /// Instance name (random adjective-noun if omitted)
        name: Option<String>,

        /// Directory to create the instance in (defaults to the configured base directory)
        #[arg(long, value_name = "DIR")]
        parent: Option<PathBuf>,

        /// Template directory containing docker-compose.yml and env-template
        #[arg(long, value_name = "DIR")]
        template: Option<PathBuf>,

        /// Use this web port instead of a random one
        #[arg(long, value_name = "PORT")]
        web_port: Option<u16>,

        /// Software image version written to .env
        #[arg(long, default_value = "latest")]
        software_version: String,

        /// Database image version written to .env
        #[arg(long, default_value = "11.4")]
        db_version: String,
    },
    /// Stop an instance's containers, delete its directory and unregister it
    Delete {
        name: String,
    },
    /// List registered instances
    List,
    /// Refresh every instance's status from the container runtime
    Status,
    /// Register an existing instance directory
    Register {
        path: PathBuf,

        /// Name to register under (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove an instance from the registry without touching its files
    Unregister {
        name: String,
    },
    /// Remove registry entries whose directory no longer exists
    Prune,
    /// Print an instance's directory
    Locate {
        name: String,
    },
    /// Show assigned ports and flag duplicates
    Ports,
    /// Find instance directories that are not registered
    Orphans {
        /// Directory to scan (defaults to the configured base directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Register every orphan found
        #[arg(long, conflicts_with = "discard")]
        adopt: bool,

        /// Delete every orphan found
        #[arg(long)]
        discard: bool,
    },
    /// Record the software and database versions of an instance
    Versions {
        name: String,

        #[arg(long)]
        software: Option<String>,

        #[arg(long)]
        db: Option<String>,
    },
    /// Read or change global configuration
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Inspect or repair the registry file
    #[command(subcommand)]
    Meta(MetaCommands),
    /// Check the environment and the registry for problems
    Doctor,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show every key
    Show,
    /// Print one key
    Get { key: String },
    /// Set one key
    Set { key: String, value: String },
    /// Reset one key to its default
    Unset { key: String },
}

#[derive(Subcommand, Debug)]
pub enum MetaCommands {
    /// Print the registry
    Show,
    /// Print the registry file path
    Path,
    /// Parse the registry strictly and report inconsistencies
    Validate,
    /// Open the registry in an editor, then validate it
    Edit,
    /// Remove a stale registry lock
    Unlock,
}

impl Cli {
    /// `warn` by default, raised by each `-v`.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }
}
