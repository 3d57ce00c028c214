//! Central instance registry: name to record, persisted as JSON under the
//! storage root and guarded by the sentinel lock.

mod audit;
mod marker;
mod ops;
mod types;

pub use audit::{audit, Audit};
pub use marker::{
    ensure_instance_dir, read_marker, seed_record, sync_marker_status, write_marker,
    InstanceMarker, REQUIRED_FILES,
};
pub use ops::{find_by_directory, Conflict, Registry};
pub use types::{now_timestamp, InstanceRecord, InstanceStatus, RegistryMap, UNKNOWN};
