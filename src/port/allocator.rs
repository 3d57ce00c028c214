use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;

use super::{PortProbe, PortRange, PortRequest};
use crate::error::{AppError, Result};
use crate::registry::RegistryMap;

/// Service name to allocated port.
pub type PortPlan = BTreeMap<String, u16>;

/// Every port currently recorded in the registry.
pub fn claimed_ports(map: &RegistryMap) -> BTreeSet<u16> {
    map.values()
        .filter_map(|record| record.assigned_port)
        .collect()
}

/// Find a port in `range` that is neither in `claimed` nor busy on the host.
///
/// Each draw is uniform over the ports of the range not yet claimed. Ports the
/// probe rejects are added to `claimed`, so the set reflects the whole search
/// session. The search gives up after `2 * range.len()` attempts.
pub fn allocate_port<P, R>(
    range: PortRange,
    claimed: &mut BTreeSet<u16>,
    probe: &P,
    rng: &mut R,
) -> Result<u16>
where
    P: PortProbe + ?Sized,
    R: Rng + ?Sized,
{
    let mut candidates: Vec<u16> = range.iter().filter(|p| !claimed.contains(p)).collect();
    let budget = range.len() * 2;

    for attempt in 0..budget {
        if candidates.is_empty() {
            break;
        }
        let port = candidates.swap_remove(rng.gen_range(0..candidates.len()));
        if probe.is_free(port) {
            log::debug!(
                "Allocated port {} from {} after {} attempt(s)",
                port,
                range,
                attempt + 1
            );
            return Ok(port);
        }
        log::debug!("Port {} is busy on this host", port);
        claimed.insert(port);
    }

    Err(AppError::no_available_port(range.lower(), range.upper()))
}

/// Allocate one port per request. Each pick joins `claimed` before the next
/// request is served, so the plan never reuses a port.
pub fn allocate_plan<P, R>(
    requests: &[PortRequest],
    claimed: &mut BTreeSet<u16>,
    probe: &P,
    rng: &mut R,
) -> Result<PortPlan>
where
    P: PortProbe + ?Sized,
    R: Rng + ?Sized,
{
    let mut plan = PortPlan::new();
    for request in requests {
        let port = allocate_port(request.range, claimed, probe, rng)?;
        claimed.insert(port);
        plan.insert(request.service.to_string(), port);
    }
    Ok(plan)
}
