//! On-disk persistence primitives: atomic record files and the sentinel lock.

mod atomic;
mod sentinel;

pub use atomic::{
    load, preserve_corrupt, read_or_default, read_strict, write_atomic, write_bytes_atomic,
    Format, Loaded,
};
pub use sentinel::{held_for, lock, unlock, with_lock, SentinelGuard};
