//! enclave-agentd: the computation agent that runs inside a guest VM.

use std::net::SocketAddr;

use anyhow::{Context, Result};

use enclave_agent::{SandboxExecutor, SessionStore};
use enclave_core::config::EnclaveConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = EnclaveConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = EnclaveConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        EnclaveConfig::default()
    });
    let agent = config.agent;

    let addr: SocketAddr = format!("{}:{}", agent.listen_addr, agent.port)
        .parse()
        .with_context(|| format!("invalid agent listen address {}:{}", agent.listen_addr, agent.port))?;

    tracing::info!(
        interpreter = %agent.sandbox.interpreter,
        work_dir = %agent.sandbox.work_dir.display(),
        timeout_secs = agent.sandbox.timeout_secs,
        "enclave-agentd starting"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    let sessions = SessionStore::new(SandboxExecutor::new(agent.sandbox), shutdown_tx.clone());
    let state = enclave_api::ApiState { sessions };

    let api_task = tokio::spawn(async move {
        if let Err(e) = enclave_api::serve(state, addr).await {
            tracing::error!(error = %e, "agent API failed");
        }
    });

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = api_task           => tracing::error!("agent API exited: {:?}", r),
    }

    Ok(())
}
