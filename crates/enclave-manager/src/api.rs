//! Manager HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use tower_http::cors::{Any, CorsLayer};

use enclave_core::wire::{ManagerRunResponse, VmInfo, VmList};

use crate::orchestrator::{Orchestrator, OrchestratorError};

#[derive(Clone)]
pub struct ManagerState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn router(state: ManagerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/run", post(handle_run))
        .route("/vms", get(handle_vms))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

fn orchestrator_error(e: OrchestratorError) -> (StatusCode, String) {
    let status = match &e {
        OrchestratorError::Ports(_) => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::Provisioning(_) | OrchestratorError::Remote(_) => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

// ── /run (POST) ───────────────────────────────────────────────────────────────

/// Body is the computation JSON, forwarded to the agent untouched.
async fn handle_run(
    State(state): State<ManagerState>,
    body: Bytes,
) -> Result<Json<ManagerRunResponse>, (StatusCode, String)> {
    if serde_json::from_slice::<serde_json::Value>(&body).is_err() {
        return Err((StatusCode::BAD_REQUEST, "computation must be JSON".to_string()));
    }
    let handoff = state
        .orchestrator
        .run(&body)
        .await
        .map_err(orchestrator_error)?;
    Ok(Json(ManagerRunResponse {
        vm_id: handoff.vm_id,
        ports: handoff.ports,
        session_id: handoff.ack.session_id,
        computation: handoff.ack.computation,
    }))
}

// ── /vms (GET) ────────────────────────────────────────────────────────────────

async fn handle_vms(State(state): State<ManagerState>) -> Json<VmList> {
    let vms = state
        .orchestrator
        .vms()
        .into_iter()
        .map(|vm| VmInfo {
            vm_id: vm.vm_id,
            ports: vm.ports,
            pid: vm.pid,
            created_at: vm.created_at,
        })
        .collect();
    Json(VmList { vms })
}

pub async fn serve_on(state: ManagerState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub async fn serve(state: ManagerState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "manager API listening");
    serve_on(state, listener).await
}
