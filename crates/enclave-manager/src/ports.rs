//! Forwarded-port allocation for guest VMs.
//!
//! Two VMs on one host cannot forward the same host port. Each VM gets a
//! triple (ssh, aux, agent) that no earlier VM of this manager received.
//! The orchestrator reads the candidate with [`PortAllocator::peek`] and only
//! calls [`PortAllocator::commit`] once the VM actually exists, all while
//! holding its allocation lock.

use enclave_core::config::HostPorts;
use enclave_core::PortTriple;

/// Some counter has run past `u16::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("forwarded host ports exhausted")]
pub struct PortsExhausted;

pub trait PortAllocator: Send {
    /// The triple the next VM will receive.
    fn peek(&self) -> Result<PortTriple, PortsExhausted>;

    /// Mark `ports` as in use.
    fn commit(&mut self, ports: PortTriple);
}

/// Counts every port up by one per VM. Ports are never returned, and once
/// any counter would pass `u16::MAX` every later `peek` fails.
#[derive(Debug, Clone)]
pub struct MonotonicPorts {
    next: Option<PortTriple>,
}

impl MonotonicPorts {
    pub fn new(base: HostPorts) -> Self {
        Self {
            next: Some(PortTriple {
                ssh: base.ssh,
                aux: base.aux,
                agent: base.agent,
            }),
        }
    }
}

impl PortAllocator for MonotonicPorts {
    fn peek(&self) -> Result<PortTriple, PortsExhausted> {
        self.next.ok_or(PortsExhausted)
    }

    fn commit(&mut self, ports: PortTriple) {
        self.next = match (
            ports.ssh.checked_add(1),
            ports.aux.checked_add(1),
            ports.agent.checked_add(1),
        ) {
            (Some(ssh), Some(aux), Some(agent)) => Some(PortTriple { ssh, aux, agent }),
            _ => None,
        };
    }
}
