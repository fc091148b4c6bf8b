//! Configuration system for enclave.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $ENCLAVE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/enclave/config.toml
//!   3. ~/.config/enclave/config.toml
//!
//! The agent and the manager read the same file; each only looks at its
//! own section.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Sentinel bracketing the artifact on the algorithm's stdout.
pub const DEFAULT_MARKER: &str = "===MODEL_MARKER===";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnclaveConfig {
    pub agent: AgentConfig,
    pub manager: ManagerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Address the agent API binds to inside the guest.
    pub listen_addr: String,
    pub port: u16,
    pub sandbox: SandboxSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Interpreter binary that receives the algorithm as an inline program.
    pub interpreter: String,
    /// Arguments placed before the algorithm body, e.g. `-c`.
    pub interpreter_args: Vec<String>,
    /// Parent of the per-session scratch directories.
    pub work_dir: PathBuf,
    /// File name handed to the algorithm as its output path.
    pub result_file: String,
    pub marker: String,
    /// Wall-clock limit for one execution. 0 = unlimited.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub listen_addr: String,
    pub port: u16,
    /// Fixed wait between VM creation and the first agent call.
    pub boot_grace_secs: u64,
    /// Host on which forwarded guest ports are reachable.
    pub agent_host: String,
    pub vm: VmSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmSettings {
    pub qemu_binary: String,
    pub machine: String,
    pub cpus: u32,
    pub memory_mb: u64,
    pub disk_image: PathBuf,
    /// Direct kernel boot. Empty = boot from the disk image.
    pub kernel: Option<PathBuf>,
    /// Host-side ports handed to the first VM; later VMs count up from here.
    pub base_ports: HostPorts,
    /// Guest-side ports the forwards point at. Identical for every VM.
    pub guest_ports: GuestPorts,
}

/// Host end of each forward. Unset keys fall back to unprivileged ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPorts {
    pub ssh: u16,
    pub aux: u16,
    pub agent: u16,
}

/// Guest end of each forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestPorts {
    pub ssh: u16,
    pub aux: u16,
    pub agent: u16,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: 7002,
            sandbox: SandboxSettings::default(),
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: vec!["-c".to_string()],
            work_dir: PathBuf::from("/tmp/enclave-agent"),
            result_file: "result.bin".to_string(),
            marker: DEFAULT_MARKER.to_string(),
            timeout_secs: 0,
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_string(),
            port: 9021,
            boot_grace_secs: 20,
            agent_host: "127.0.0.1".to_string(),
            vm: VmSettings::default(),
        }
    }
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            qemu_binary: "qemu-system-x86_64".to_string(),
            machine: "q35".to_string(),
            cpus: 4,
            memory_mb: 4096,
            disk_image: data_dir().join("img").join("focal-server-cloudimg-amd64.img"),
            kernel: None,
            base_ports: HostPorts::default(),
            guest_ports: GuestPorts::default(),
        }
    }
}

impl Default for HostPorts {
    fn default() -> Self {
        Self {
            ssh: 2222,
            aux: 9301,
            agent: 7020,
        }
    }
}

impl Default for GuestPorts {
    fn default() -> Self {
        Self {
            ssh: 22,
            aux: 9031,
            agent: 7002,
        }
    }
}

impl SandboxSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl ManagerConfig {
    pub fn boot_grace(&self) -> Duration {
        Duration::from_secs(self.boot_grace_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("enclave")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("enclave")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl EnclaveConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&Self::file_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read one file without env overrides. A missing file yields defaults.
    pub fn load_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(EnclaveConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("ENCLAVE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&EnclaveConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply ENCLAVE_* overrides. `lookup` is `std::env::var` outside tests.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ENCLAVE_AGENT__LISTEN_ADDR") {
            self.agent.listen_addr = v;
        }
        if let Some(p) = lookup("ENCLAVE_AGENT__PORT").and_then(|v| v.parse().ok()) {
            self.agent.port = p;
        }
        if let Some(v) = lookup("ENCLAVE_AGENT__SANDBOX__INTERPRETER") {
            self.agent.sandbox.interpreter = v;
        }
        if let Some(v) = lookup("ENCLAVE_AGENT__SANDBOX__WORK_DIR") {
            self.agent.sandbox.work_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ENCLAVE_AGENT__SANDBOX__MARKER") {
            self.agent.sandbox.marker = v;
        }
        if let Some(s) = lookup("ENCLAVE_AGENT__SANDBOX__TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.agent.sandbox.timeout_secs = s;
        }
        if let Some(p) = lookup("ENCLAVE_MANAGER__PORT").and_then(|v| v.parse().ok()) {
            self.manager.port = p;
        }
        if let Some(s) = lookup("ENCLAVE_MANAGER__BOOT_GRACE_SECS").and_then(|v| v.parse().ok()) {
            self.manager.boot_grace_secs = s;
        }
        if let Some(v) = lookup("ENCLAVE_MANAGER__AGENT_HOST") {
            self.manager.agent_host = v;
        }
        if let Some(v) = lookup("ENCLAVE_MANAGER__VM__QEMU_BINARY") {
            self.manager.vm.qemu_binary = v;
        }
        if let Some(v) = lookup("ENCLAVE_MANAGER__VM__DISK_IMAGE") {
            self.manager.vm.disk_image = PathBuf::from(v);
        }
    }
}
