//! Instance workflows that combine the port allocator, the registry and the
//! file system: creation, deletion, status scans, registration of existing
//! directories and orphan recovery.

mod create;
mod delete;
mod journal;
mod orphans;
mod register;
mod status;
pub mod template;

pub use create::{CreateOptions, CreatedInstance};
pub use delete::DeleteReport;
pub use journal::CreationJournal;
pub use orphans::{find_orphans, Orphan};
pub use register::Registered;
pub use status::{scan_status, StatusChange};
pub use template::TemplateSource;

use crate::cancel::CancellationToken;
use crate::output::UserOutput;
use crate::port::PortProbe;
use crate::prompt::Confirm;
use crate::registry::Registry;
use crate::runtime::ContainerRuntime;

/// Everything a workflow talks to, borrowed from the command layer.
pub struct Orchestrator<'a> {
    pub registry: &'a Registry,
    pub runtime: &'a dyn ContainerRuntime,
    pub probe: &'a dyn PortProbe,
    pub confirm: &'a dyn Confirm,
    pub output: &'a dyn UserOutput,
    pub cancel: CancellationToken,
}
