use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::broadcast;

use enclave_core::Computation;

use crate::sandbox::SandboxExecutor;
use crate::session::{short, ComputationSession, SessionError};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// In-memory arena of computation sessions, keyed by session id.
#[derive(Clone)]
pub struct SessionStore {
    /// session_id → session
    sessions: Arc<DashMap<String, Arc<ComputationSession>>>,
    executor: Arc<SandboxExecutor>,
    /// Stops every session's event loop when fired.
    shutdown: broadcast::Sender<()>,
    seq: Arc<AtomicU64>,
}

impl SessionStore {
    pub fn new(executor: SandboxExecutor, shutdown: broadcast::Sender<()>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            executor: Arc::new(executor),
            shutdown,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open a new session and accept `computation` into it.
    /// Returns the session id and the acknowledgment.
    pub async fn create(&self, computation: Computation) -> Result<(String, String), SessionError> {
        let id = self.next_id(&computation)?;
        let session = Arc::new(ComputationSession::new(
            id.clone(),
            self.executor.clone(),
            self.shutdown.clone(),
        ));
        let ack = session.run(computation).await?;
        self.sessions.insert(id.clone(), session);
        tracing::info!(session = short(&id), total = self.sessions.len(), "session created");
        Ok((id, ack))
    }

    pub fn get(&self, id: &str) -> Option<Arc<ComputationSession>> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    /// Remove a session. Its event loop stops once in-flight requests
    /// holding the session finish.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            tracing::info!(session = short(id), "session removed");
        }
        removed
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn marker(&self) -> &str {
        &self.executor.settings().marker
    }

    fn next_id(&self, computation: &Computation) -> Result<String, SessionError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut h = blake3::Hasher::new();
        h.update(&seq.to_le_bytes());
        h.update(&now_ms().to_le_bytes());
        h.update(&serde_json::to_vec(computation)?);
        Ok(hex::encode(h.finalize().as_bytes()))
    }
}
