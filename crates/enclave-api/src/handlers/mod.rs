//! HTTP API handlers: exposes the agent contract over JSON and raw bytes.

pub mod sessions;
pub mod status;

use std::sync::Arc;

use axum::http::StatusCode;

use enclave_agent::{ComputationSession, SandboxError, SessionError, SessionStore};

#[derive(Clone)]
pub struct ApiState {
    pub sessions: SessionStore,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn lookup(state: &ApiState, id: &str) -> Result<Arc<ComputationSession>, (StatusCode, String)> {
    state
        .sessions
        .get(id)
        .ok_or((StatusCode::NOT_FOUND, "session not found".to_string()))
}

fn session_error(e: SessionError) -> (StatusCode, String) {
    let status = match &e {
        SessionError::MissingAlgorithm | SessionError::MissingDataset => StatusCode::CONFLICT,
        SessionError::Sandbox(SandboxError::Extraction(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Sandbox(SandboxError::Execution(_)) | SessionError::Serialize(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

// Re-export handler functions for use in router setup.
pub use sessions::{
    handle_algo, handle_data, handle_result, handle_run, handle_session_create,
    handle_session_drop, handle_session_list, handle_state,
};
pub use status::handle_status;
