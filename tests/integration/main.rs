//! Enclave integration test harness.
//!
//! Everything runs in-process on loopback. A "VM" is an agent API bound to
//! the forwarded agent port the orchestrator allocated, so the manager talks
//! to a real agent over HTTP exactly as it would through QEMU's forwards.
//!
//!   cargo test --test integration
//!
//! Tests that need python3 skip themselves when it is not installed.

mod agent_flow;
mod failures;
mod orchestration;
mod python;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;

use enclave_agent::{SandboxExecutor, SessionStore};
use enclave_api::ApiState;
use enclave_core::config::{HostPorts, ManagerConfig, SandboxSettings};
use enclave_manager::{
    HttpAgentClient, ManagerState, Orchestrator, ProvisionError, Provisioner, VmConfig, VmHandle,
};

pub const ARTIFACT_ALGO: &[u8] = b"printf 'setup\\n===MODEL_MARKER===ABC123===MODEL_MARKER===\\ndone\\n'";

// ── Harness ───────────────────────────────────────────────────────────────────

/// Per-test scratch directory for sandbox output files.
pub fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("enclave-it-{}-{}", name, std::process::id()))
}

/// Sandbox settings that run algorithms as `sh -c` scripts.
pub fn sh_sandbox(name: &str) -> SandboxSettings {
    SandboxSettings {
        interpreter: "sh".to_string(),
        interpreter_args: vec!["-c".to_string()],
        work_dir: scratch_dir(name),
        ..SandboxSettings::default()
    }
}

/// An agent API serving on loopback until dropped.
pub struct Agent {
    pub addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl Agent {
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        self.task.abort();
    }
}

/// Start an agent on `port` (0 for any free port).
pub async fn spawn_agent(sandbox: SandboxSettings, port: u16) -> Result<Agent> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind agent port {port}"))?;
    let addr = listener.local_addr()?;

    let (shutdown, _) = broadcast::channel(1);
    let sessions = SessionStore::new(SandboxExecutor::new(sandbox), shutdown.clone());
    let task = tokio::spawn(async move {
        let _ = enclave_api::serve_on(ApiState { sessions }, listener).await;
    });

    Ok(Agent {
        addr,
        shutdown,
        task,
    })
}

/// A free loopback port, released before returning.
pub fn free_port() -> u16 {
    let l = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    l.local_addr().expect("local addr").port()
}

/// First port of `n` consecutive free loopback ports, all released before
/// returning.
pub fn free_port_range(n: u16) -> u16 {
    for _ in 0..100 {
        let base = free_port();
        if base.checked_add(n).is_none() {
            continue;
        }
        let held: Vec<_> = (base..base + n)
            .map_while(|p| std::net::TcpListener::bind(("127.0.0.1", p)).ok())
            .collect();
        if held.len() == n as usize {
            return base;
        }
    }
    panic!("no run of {n} free loopback ports found");
}

/// "Boots" a VM by starting an agent on its forwarded agent port.
pub struct LoopbackProvisioner {
    sandbox: SandboxSettings,
    /// Skip starting the agent, leaving the forwarded port dead.
    pub without_agent: bool,
    pub agents: tokio::sync::Mutex<Vec<Agent>>,
}

impl LoopbackProvisioner {
    pub fn new(sandbox: SandboxSettings) -> Self {
        Self {
            sandbox,
            without_agent: false,
            agents: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Provisioner for LoopbackProvisioner {
    async fn create_vm(&self, config: &VmConfig) -> Result<VmHandle, ProvisionError> {
        if !self.without_agent {
            let agent = spawn_agent(self.sandbox.clone(), config.ports.agent)
                .await
                .map_err(|e| ProvisionError::Backend(e.to_string()))?;
            self.agents.lock().await.push(agent);
        }
        Ok(VmHandle {
            name: config.name.clone(),
            pid: None,
        })
    }
}

/// Always fails, like a host with no hypervisor.
pub struct NoHypervisor;

#[async_trait]
impl Provisioner for NoHypervisor {
    async fn create_vm(&self, _config: &VmConfig) -> Result<VmHandle, ProvisionError> {
        Err(ProvisionError::Backend("no hypervisor available".to_string()))
    }
}

/// Agent ports a single test may hand out.
pub const MAX_VMS_PER_TEST: u16 = 8;

/// Manager config on loopback whose first `MAX_VMS_PER_TEST` agent ports
/// are free.
pub fn manager_config() -> ManagerConfig {
    let mut config = ManagerConfig {
        boot_grace_secs: 0,
        agent_host: "127.0.0.1".to_string(),
        ..ManagerConfig::default()
    };
    config.vm.base_ports = HostPorts {
        ssh: 2222,
        aux: 9301,
        agent: free_port_range(MAX_VMS_PER_TEST),
    };
    config
}

/// A manager API on loopback. Returns its `/api` base URL.
pub async fn spawn_manager(provisioner: Arc<dyn Provisioner>, config: &ManagerConfig) -> Result<String> {
    let orchestrator = Orchestrator::new(config, provisioner, Arc::new(HttpAgentClient::new()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ManagerState {
        orchestrator: Arc::new(orchestrator),
    };
    tokio::spawn(async move {
        let _ = enclave_manager::api::serve_on(state, listener).await;
    });
    Ok(format!("http://{addr}/api"))
}

pub async fn post(url: &str, body: impl Into<reqwest::Body>) -> Result<reqwest::Response> {
    reqwest::Client::new()
        .post(url)
        .body(body)
        .send()
        .await
        .with_context(|| format!("POST {url}"))
}

pub async fn get(url: &str) -> Result<reqwest::Response> {
    reqwest::get(url).await.with_context(|| format!("GET {url}"))
}

/// Poll a session's state until it equals `want`.
pub async fn wait_for_state(session_url: &str, want: &str) -> Result<()> {
    let mut last = String::new();
    for _ in 0..200 {
        let v: serde_json::Value = get(&format!("{session_url}/state")).await?.json().await?;
        last = v["state"].as_str().unwrap_or_default().to_string();
        if last == want {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("session never reached {want}, last state {last}")
}

pub fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
