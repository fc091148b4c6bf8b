//! /status handler.

use axum::extract::State;
use axum::Json;

use enclave_core::wire::AgentStatus;

use super::ApiState;

pub async fn handle_status(State(state): State<ApiState>) -> Json<AgentStatus> {
    Json(AgentStatus {
        sessions: state.sessions.len(),
        marker: state.sessions.marker().to_string(),
    })
}
