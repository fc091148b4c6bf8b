//! HTTP body types shared by the agent API, the manager, and enclave-ctl.

use serde::{Deserialize, Serialize};

/// Response to an accepted computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAck {
    /// Session the computation was staged into.
    pub session_id: String,
    /// Canonical JSON of the accepted descriptor.
    pub computation: String,
}

/// Reference token for a staged algorithm or dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<SessionState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDropResponse {
    pub session_id: String,
    pub dropped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub sessions: usize,
    pub marker: String,
}

/// Forwarded host ports of one VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortTriple {
    pub ssh: u16,
    pub aux: u16,
    pub agent: u16,
}

/// Manager response to `POST /api/run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerRunResponse {
    pub vm_id: String,
    pub ports: PortTriple,
    pub session_id: String,
    pub computation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmInfo {
    pub vm_id: String,
    pub ports: PortTriple,
    pub pid: Option<u32>,
    /// Unix ms.
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmList {
    pub vms: Vec<VmInfo>,
}
