//! VM provisioning backends.
//!
//! The orchestrator only needs `create_vm`. Backends are not retried and
//! must not leave anything behind when they fail.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use enclave_core::config::VmSettings;
use enclave_core::PortTriple;

/// Everything a backend needs to bring up one VM.
#[derive(Debug, Clone)]
pub struct VmConfig {
    pub name: String,
    pub settings: VmSettings,
    /// Host side of the three forwards.
    pub ports: PortTriple,
}

/// A VM the backend created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmHandle {
    pub name: String,
    pub pid: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for VM process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("VM process exited during startup with {status}: {stderr}")]
    EarlyExit { status: ExitStatus, stderr: String },
    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn create_vm(&self, config: &VmConfig) -> Result<VmHandle, ProvisionError>;
}

/// How long a freshly spawned QEMU must stay up to count as started.
const STARTUP_WATCH: Duration = Duration::from_millis(500);

/// Launches each VM as a QEMU child process with user-mode networking.
#[derive(Debug, Clone, Default)]
pub struct QemuProvisioner;

impl QemuProvisioner {
    pub fn new() -> Self {
        Self
    }

    /// QEMU arguments for `config`.
    pub fn args(config: &VmConfig) -> Vec<String> {
        let vm = &config.settings;
        let host = config.ports;
        let guest = vm.guest_ports;

        let mut args = vec![
            "-name".to_string(),
            config.name.clone(),
            "-machine".to_string(),
            vm.machine.clone(),
            "-smp".to_string(),
            vm.cpus.to_string(),
            "-m".to_string(),
            format!("{}M", vm.memory_mb),
            "-drive".to_string(),
            format!("file={},if=virtio,snapshot=on", vm.disk_image.display()),
            "-netdev".to_string(),
            format!(
                "user,id=net0,hostfwd=tcp::{}-:{},hostfwd=tcp::{}-:{},hostfwd=tcp::{}-:{}",
                host.ssh, guest.ssh, host.aux, guest.aux, host.agent, guest.agent
            ),
            "-device".to_string(),
            "virtio-net-pci,netdev=net0".to_string(),
            "-nographic".to_string(),
            "-monitor".to_string(),
            "none".to_string(),
        ];
        if let Some(kernel) = &vm.kernel {
            args.push("-kernel".to_string());
            args.push(kernel.display().to_string());
        }
        args
    }
}

#[async_trait]
impl Provisioner for QemuProvisioner {
    async fn create_vm(&self, config: &VmConfig) -> Result<VmHandle, ProvisionError> {
        let binary = &config.settings.qemu_binary;
        let mut child = Command::new(binary)
            .args(Self::args(config))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProvisionError::Spawn {
                binary: binary.clone(),
                source,
            })?;
        let pid = child.id();
        let stderr = child.stderr.take();

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(ProvisionError::Wait)?;
                let mut buf = String::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_string(&mut buf).await;
                }
                return Err(ProvisionError::EarlyExit { status, stderr: buf });
            }
            _ = tokio::time::sleep(STARTUP_WATCH) => {}
        }

        tracing::info!(vm = %config.name, ?pid, ports = ?config.ports, "VM process started");

        // The VM outlives this call. Keep its stderr drained and log its exit.
        let name = config.name.clone();
        tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(vm = %name, "{line}");
                }
            }
            match child.wait().await {
                Ok(status) => tracing::warn!(vm = %name, %status, "VM process exited"),
                Err(e) => tracing::warn!(vm = %name, error = %e, "failed waiting for VM process"),
            }
        });

        Ok(VmHandle {
            name: config.name.clone(),
            pid,
        })
    }
}
