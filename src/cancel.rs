//! Cooperative cancellation for the creation workflow.
//!
//! The Ctrl-C handler only flips a flag; long-running steps check it between
//! sub-steps and unwind through the normal error path so rollback runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{AppError, Result};

/// Shared cancellation flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Cancelled` error once cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AppError::cancelled("interrupted"))
        } else {
            Ok(())
        }
    }

    /// Token cancelled by Ctrl-C. Only one handler can be installed per
    /// process; a second install is logged and the token simply never fires.
    pub fn from_ctrlc() -> Self {
        let token = Self::new();
        let handler_token = token.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            if handler_token.is_cancelled() {
                std::process::exit(130);
            }
            handler_token.cancel();
        }) {
            log::warn!("Failed to install Ctrl-C handler: {}", e);
        }
        token
    }
}
