//! enclave-manager: provisions one guest VM per computation.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};

use enclave_core::config::EnclaveConfig;
use enclave_manager::{HttpAgentClient, ManagerState, Orchestrator, QemuProvisioner};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = EnclaveConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = EnclaveConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        EnclaveConfig::default()
    });
    let manager = config.manager;

    let addr: SocketAddr = format!("{}:{}", manager.listen_addr, manager.port)
        .parse()
        .with_context(|| format!("invalid manager listen address {}:{}", manager.listen_addr, manager.port))?;

    tracing::info!(
        qemu = %manager.vm.qemu_binary,
        disk_image = %manager.vm.disk_image.display(),
        boot_grace_secs = manager.boot_grace_secs,
        base_ports = ?manager.vm.base_ports,
        "enclave-manager starting"
    );

    let orchestrator = Orchestrator::new(
        &manager,
        Arc::new(QemuProvisioner::new()),
        Arc::new(HttpAgentClient::new()),
    );
    let state = ManagerState {
        orchestrator: Arc::new(orchestrator),
    };

    let api_task = tokio::spawn(async move {
        if let Err(e) = enclave_manager::api::serve(state, addr).await {
            tracing::error!(error = %e, "manager API failed");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
        r = api_task                => tracing::error!("manager API exited: {:?}", r),
    }

    Ok(())
}
