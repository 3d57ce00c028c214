use std::net::TcpListener;

use crate::error::{AppError, Result};

/// OS-level liveness check for a candidate port.
pub trait PortProbe {
    /// `true` when a listener could be opened (and released) on `port`.
    fn is_free(&self, port: u16) -> bool;
}

/// Probes the local host by binding and immediately dropping a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl PortProbe for HostProbe {
    fn is_free(&self, port: u16) -> bool {
        if TcpListener::bind(("0.0.0.0", port)).is_err() {
            return false;
        }
        portpicker::is_free_tcp(port)
    }
}

impl<F> PortProbe for F
where
    F: Fn(u16) -> bool,
{
    fn is_free(&self, port: u16) -> bool {
        self(port)
    }
}

/// Check a port the user asked for explicitly.
pub fn check_port_available(port: u16, probe: &dyn PortProbe) -> Result<()> {
    if !probe.is_free(port) {
        return Err(AppError::port_occupied(port, "in use on this host"));
    }
    Ok(())
}
