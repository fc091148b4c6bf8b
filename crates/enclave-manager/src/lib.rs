//! Host-side VM manager.
//!
//! Each accepted computation gets its own guest VM. The orchestrator picks
//! a fresh forwarded-port triple, asks a [`Provisioner`] for the VM, waits
//! out the boot grace period and then hands the computation to the agent
//! listening behind the forwarded agent port.

pub mod api;
pub mod orchestrator;
pub mod ports;
pub mod provision;
pub mod remote;

pub use api::ManagerState;
pub use orchestrator::{Handoff, Orchestrator, OrchestratorError, VmRecord};
pub use ports::{MonotonicPorts, PortAllocator};
pub use provision::{ProvisionError, Provisioner, QemuProvisioner, VmConfig, VmHandle};
pub use remote::{AgentEndpoint, HttpAgentClient, RemoteAgent, RemoteError};
