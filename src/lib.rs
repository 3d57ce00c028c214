mod cancel;
mod cli;
mod commands;
mod doctor;
mod envfile;
mod output;
mod prompt;
mod runtime;
mod validation;

pub mod config;
pub mod error;
pub mod instance;
pub mod paths;
pub mod port;
pub mod registry;
pub mod store;

use std::process::ExitCode;

use clap::Parser as _;

pub use cancel::CancellationToken;
pub use cli::Cli;
pub use error::{AppError, ErrorKind, Result};
pub use output::{CliOutput, QuietOutput, UserOutput};
pub use prompt::{Confirm, FixedAnswer, TerminalConfirm};
pub use runtime::{ContainerRuntime, DockerCompose};
pub use validation::{random_instance_name, validate_instance_name};

/// Parse the command line, set up logging and run the command.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .init();

    commands::dispatch(cli)
}
