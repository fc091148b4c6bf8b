//! VM orchestrator: one VM per computation.
//!
//! `run` provisions a VM on a fresh port triple, waits a fixed boot grace
//! period, then hands the computation to the agent inside the guest. There
//! is no readiness check and no retry: if the guest is slower than the
//! grace period the agent call fails and that error is returned as is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::Mutex;

use enclave_core::config::{ManagerConfig, VmSettings};
use enclave_core::{PortTriple, RunAck};

use crate::ports::{MonotonicPorts, PortAllocator, PortsExhausted};
use crate::provision::{ProvisionError, Provisioner, VmConfig};
use crate::remote::{AgentEndpoint, RemoteAgent, RemoteError};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Provisioning(#[from] ProvisionError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Ports(#[from] PortsExhausted),
}

/// A VM this orchestrator created. VMs are never torn down.
#[derive(Debug, Clone)]
pub struct VmRecord {
    pub vm_id: String,
    pub ports: PortTriple,
    pub pid: Option<u32>,
    /// Unix ms.
    pub created_at: u64,
}

/// Result of a successful handoff.
#[derive(Debug, Clone)]
pub struct Handoff {
    pub vm_id: String,
    pub ports: PortTriple,
    pub ack: RunAck,
}

pub struct Orchestrator {
    provisioner: Arc<dyn Provisioner>,
    agent: Arc<dyn RemoteAgent>,
    /// Held from peek through commit so concurrent runs never share ports.
    ports: Mutex<Box<dyn PortAllocator>>,
    vm_settings: VmSettings,
    agent_host: String,
    boot_grace: Duration,
    vms: DashMap<String, VmRecord>,
    seq: AtomicU64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// At most the first 16 characters of `id`, for log fields.
fn short(id: &str) -> &str {
    match id.char_indices().nth(16) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

impl Orchestrator {
    pub fn new(
        config: &ManagerConfig,
        provisioner: Arc<dyn Provisioner>,
        agent: Arc<dyn RemoteAgent>,
    ) -> Self {
        Self {
            provisioner,
            agent,
            ports: Mutex::new(Box::new(MonotonicPorts::new(config.vm.base_ports))),
            vm_settings: config.vm.clone(),
            agent_host: config.agent_host.clone(),
            boot_grace: config.boot_grace(),
            vms: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Replace the default monotonic allocator.
    pub fn with_port_allocator(mut self, allocator: Box<dyn PortAllocator>) -> Self {
        self.ports = Mutex::new(allocator);
        self
    }

    /// Provision a VM for `computation` and hand the computation to its agent.
    pub async fn run(&self, computation: &[u8]) -> Result<Handoff, OrchestratorError> {
        let vm_id = format!("enclave-vm-{}", self.seq.fetch_add(1, Ordering::Relaxed));

        let (ports, handle) = {
            let mut allocator = self.ports.lock().await;
            let ports = match allocator.peek() {
                Ok(ports) => ports,
                Err(e) => {
                    tracing::warn!(vm = %vm_id, error = %e, "no forwarded ports left");
                    return Err(e.into());
                }
            };
            let config = VmConfig {
                name: vm_id.clone(),
                settings: self.vm_settings.clone(),
                ports,
            };
            let handle = match self.provisioner.create_vm(&config).await {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!(vm = %vm_id, ?ports, error = %e, "VM provisioning failed");
                    return Err(e.into());
                }
            };
            allocator.commit(ports);
            (ports, handle)
        };

        self.vms.insert(
            vm_id.clone(),
            VmRecord {
                vm_id: vm_id.clone(),
                ports,
                pid: handle.pid,
                created_at: now_ms(),
            },
        );
        tracing::info!(
            vm = %vm_id,
            ssh = ports.ssh,
            aux = ports.aux,
            agent = ports.agent,
            boot_grace_ms = self.boot_grace.as_millis() as u64,
            "VM provisioned, waiting for guest boot"
        );

        tokio::time::sleep(self.boot_grace).await;

        let endpoint = AgentEndpoint {
            host: self.agent_host.clone(),
            port: ports.agent,
        };
        let ack = match self.agent.run(&endpoint, computation).await {
            Ok(ack) => ack,
            Err(e) => {
                tracing::warn!(vm = %vm_id, error = %e, "agent handoff failed");
                return Err(e.into());
            }
        };
        tracing::info!(
            vm = %vm_id,
            session = short(&ack.session_id),
            "computation handed to agent"
        );

        Ok(Handoff { vm_id, ports, ack })
    }

    /// All VMs created so far, oldest first.
    pub fn vms(&self) -> Vec<VmRecord> {
        let mut vms: Vec<VmRecord> = self.vms.iter().map(|e| e.value().clone()).collect();
        vms.sort_by_key(|v| (v.created_at, v.ports.agent));
        vms
    }
}
