//! /sessions handlers. Carries the agent contract (run, algo, data, result).

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;

use enclave_core::wire::{RunAck, SessionDropResponse, SessionList, SessionState, UploadResponse};
use enclave_core::Computation;

use super::{lookup, session_error, ApiState};

fn parse_computation(body: &[u8]) -> Result<Computation, (StatusCode, String)> {
    Computation::from_slice(body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid computation JSON: {e}")))
}

// ── /sessions (POST) ──────────────────────────────────────────────────────────

pub async fn handle_session_create(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<RunAck>, (StatusCode, String)> {
    let computation = parse_computation(&body)?;
    let (session_id, computation) = state
        .sessions
        .create(computation)
        .await
        .map_err(session_error)?;
    Ok(Json(RunAck {
        session_id,
        computation,
    }))
}

// ── /sessions (GET) ───────────────────────────────────────────────────────────

pub async fn handle_session_list(State(state): State<ApiState>) -> Json<SessionList> {
    let mut sessions = Vec::new();
    for id in state.sessions.ids() {
        // Removed between listing and lookup.
        let Some(session) = state.sessions.get(&id) else {
            continue;
        };
        sessions.push(SessionState {
            session_id: id,
            state: session.state().await.to_string(),
        });
    }
    Json(SessionList { sessions })
}

// ── /sessions/{id} (DELETE) ───────────────────────────────────────────────────

pub async fn handle_session_drop(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Json<SessionDropResponse> {
    let dropped = state.sessions.remove(&session_id);
    Json(SessionDropResponse {
        session_id,
        dropped,
    })
}

// ── /sessions/{id}/run (POST) ─────────────────────────────────────────────────

pub async fn handle_run(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Json<RunAck>, (StatusCode, String)> {
    let session = lookup(&state, &session_id)?;
    let computation = parse_computation(&body)?;
    let computation = session.run(computation).await.map_err(session_error)?;
    Ok(Json(RunAck {
        session_id,
        computation,
    }))
}

// ── /sessions/{id}/algo, /sessions/{id}/data (POST) ───────────────────────────

pub async fn handle_algo(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let session = lookup(&state, &session_id)?;
    let id = session.algo(body).await;
    Ok(Json(UploadResponse { id }))
}

pub async fn handle_data(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let session = lookup(&state, &session_id)?;
    let id = session.data(body).await;
    Ok(Json(UploadResponse { id }))
}

// ── /sessions/{id}/result (GET) ───────────────────────────────────────────────

pub async fn handle_result(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = lookup(&state, &session_id)?;
    let artifact = session.result().await.map_err(session_error)?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], artifact))
}

// ── /sessions/{id}/state (GET) ────────────────────────────────────────────────

pub async fn handle_state(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionState>, (StatusCode, String)> {
    let session = lookup(&state, &session_id)?;
    Ok(Json(SessionState {
        session_id,
        state: session.state().await.to_string(),
    }))
}
