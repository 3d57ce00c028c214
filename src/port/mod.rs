//! Port allocation for new instances.
//!
//! A successful probe does not reserve the port: another process may bind it
//! between the probe and the moment the instance's services start.

mod allocator;
mod probe;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub use allocator::{allocate_plan, allocate_port, claimed_ports, PortPlan};
pub use probe::{check_port_available, HostProbe, PortProbe};

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    lower: u16,
    upper: u16,
}

impl PortRange {
    pub fn new(lower: u16, upper: u16) -> Result<Self> {
        if lower == 0 {
            return Err(AppError::config("Port range must start at 1 or above"));
        }
        if lower > upper {
            return Err(AppError::config(format!(
                "Invalid port range {}-{}: lower bound is above upper bound",
                lower, upper
            )));
        }
        Ok(Self { lower, upper })
    }

    /// Build a range known to be valid at compile time.
    const fn fixed(lower: u16, upper: u16) -> Self {
        Self { lower, upper }
    }

    pub fn lower(&self) -> u16 {
        self.lower
    }

    pub fn upper(&self) -> u16 {
        self.upper
    }

    pub fn len(&self) -> usize {
        usize::from(self.upper - self.lower) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.lower..=self.upper).contains(&port)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.lower..=self.upper
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lower, self.upper)
    }
}

/// One port needed by an instance service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRequest {
    pub service: &'static str,
    pub range: PortRange,
}

/// Service whose port is recorded as the instance's `assigned_port`.
pub const WEB_SERVICE: &str = "web";

/// Ports every new instance gets, each drawn from its own range.
pub const DEFAULT_PLAN: [PortRequest; 4] = [
    PortRequest {
        service: WEB_SERVICE,
        range: PortRange::fixed(11000, 19999),
    },
    PortRequest {
        service: "mail_smtp",
        range: PortRange::fixed(10000, 10999),
    },
    PortRequest {
        service: "mail_web",
        range: PortRange::fixed(8000, 8999),
    },
    PortRequest {
        service: "db_admin",
        range: PortRange::fixed(8081, 8999),
    },
];
