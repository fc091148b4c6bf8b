pub mod handlers;

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// Upper bound for uploaded algorithms and datasets.
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Build the agent router. All routes live under `/api`.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route(
            "/sessions",
            get(handlers::handle_session_list).post(handlers::handle_session_create),
        )
        .route("/sessions/{id}", axum::routing::delete(handlers::handle_session_drop))
        .route("/sessions/{id}/run", post(handlers::handle_run))
        .route(
            "/sessions/{id}/algo",
            post(handlers::handle_algo).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/sessions/{id}/data",
            post(handlers::handle_data).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/sessions/{id}/result", get(handlers::handle_result))
        .route("/sessions/{id}/state", get(handlers::handle_state))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Serve the agent API on an already-bound listener.
pub async fn serve_on(state: ApiState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub async fn serve(state: ApiState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "agent API listening");
    serve_on(state, listener).await
}
