//! Computation session: one job's staged inputs, state machine, and result.
//!
//! A session goes through rounds. `run` opens a round: it records the
//! computation descriptor, clears staged payloads and the cached result,
//! and starts a fresh state machine. Within a round the FIRST algorithm and
//! the FIRST dataset submitted are the ones executed; later submissions are
//! kept but never run.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, Mutex};

use enclave_core::{content_id, Computation};

use crate::sandbox::{SandboxError, SandboxExecutor};
use crate::state::{Event, ProtocolState, StateMachine};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no algorithm has been submitted")]
    MissingAlgorithm,
    #[error("no dataset has been submitted")]
    MissingDataset,
    #[error("failed to serialize computation: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

struct Round {
    /// Bumped by every `run`. Lets `result` detect that the round it
    /// executed for has been replaced.
    generation: u64,
    computation: Option<Computation>,
    algorithms: Vec<Bytes>,
    datasets: Vec<Bytes>,
    result: Option<Bytes>,
    machine: StateMachine,
}

pub struct ComputationSession {
    id: String,
    executor: Arc<SandboxExecutor>,
    shutdown: broadcast::Sender<()>,
    round: Mutex<Round>,
    /// Held for the whole of `result` so an algorithm runs at most once per round.
    exec_lock: Mutex<()>,
}

impl ComputationSession {
    pub fn new(id: String, executor: Arc<SandboxExecutor>, shutdown: broadcast::Sender<()>) -> Self {
        let machine = StateMachine::spawn(ProtocolState::Idle, shutdown.subscribe());
        Self {
            id,
            executor,
            shutdown,
            round: Mutex::new(Round {
                generation: 0,
                computation: None,
                algorithms: Vec::new(),
                datasets: Vec::new(),
                result: None,
                machine,
            }),
            exec_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Accept a computation and open a new round. Returns the canonical
    /// JSON acknowledgment of the accepted descriptor.
    pub async fn run(&self, computation: Computation) -> Result<String, SessionError> {
        let ack = computation.ack()?;

        let mut round = self.round.lock().await;
        // Dropping the old handle closes its event source and ends its loop.
        round.machine = StateMachine::spawn(ProtocolState::Idle, self.shutdown.subscribe());
        round.generation += 1;
        round.computation = Some(computation);
        round.algorithms.clear();
        round.datasets.clear();
        round.result = None;

        // The accepted descriptor doubles as the manifest.
        round.machine.send_event(Event::Start);
        round.machine.send_event(Event::ManifestsReceived);

        tracing::info!(
            session = short(&self.id),
            generation = round.generation,
            "computation accepted"
        );
        Ok(ack)
    }

    /// Stage an algorithm. Returns its reference token.
    pub async fn algo(&self, algorithm: Bytes) -> String {
        let id = content_id(&algorithm);
        let mut round = self.round.lock().await;
        round.algorithms.push(algorithm);
        round.machine.send_event(Event::AlgorithmsReceived);
        tracing::info!(
            session = short(&self.id),
            algorithm = short(&id),
            staged = round.algorithms.len(),
            "algorithm received"
        );
        id
    }

    /// Stage a dataset. Returns its reference token.
    pub async fn data(&self, dataset: Bytes) -> String {
        let id = content_id(&dataset);
        let mut round = self.round.lock().await;
        round.datasets.push(dataset);
        round.machine.send_event(Event::DataReceived);
        tracing::info!(
            session = short(&self.id),
            dataset = short(&id),
            staged = round.datasets.len(),
            "dataset received"
        );
        id
    }

    /// Execute the first staged algorithm against the first staged dataset
    /// and return the extracted artifact. Cached until the next `run`.
    ///
    /// Failures leave any previously cached artifact in place.
    pub async fn result(&self) -> Result<Bytes, SessionError> {
        let _exec = self.exec_lock.lock().await;

        let (generation, algorithm, dataset) = {
            let round = self.round.lock().await;
            if let Some(cached) = &round.result {
                tracing::debug!(session = short(&self.id), "returning cached result");
                return Ok(cached.clone());
            }
            let algorithm = round.algorithms.first().cloned().ok_or(SessionError::MissingAlgorithm)?;
            let dataset = round.datasets.first().cloned().ok_or(SessionError::MissingDataset)?;
            (round.generation, algorithm, dataset)
        };

        let output_path = self.output_path();
        if let Some(dir) = output_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to create session work dir");
            }
        }

        let artifact = match self.executor.execute(&algorithm, &dataset, &output_path).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::warn!(session = short(&self.id), error = %e, "computation failed");
                return Err(e.into());
            }
        };

        let mut round = self.round.lock().await;
        if round.generation == generation {
            round.result = Some(artifact.clone());
            round.machine.send_event(Event::RunComplete);
            round.machine.send_event(Event::ResultsConsumed);
        } else {
            tracing::debug!(
                session = short(&self.id),
                "session re-run during execution, result not cached"
            );
        }
        tracing::info!(
            session = short(&self.id),
            bytes = artifact.len(),
            "computation result ready"
        );
        Ok(artifact)
    }

    /// Snapshot of the current round's protocol state.
    pub async fn state(&self) -> ProtocolState {
        self.round.lock().await.machine.state()
    }

    /// Wait for the current round's state machine to drain its queue.
    pub async fn settle(&self) {
        let machine = self.round.lock().await.machine.clone();
        machine.flush().await;
    }

    pub async fn computation(&self) -> Option<Computation> {
        self.round.lock().await.computation.clone()
    }

    pub async fn cached_result(&self) -> Option<Bytes> {
        self.round.lock().await.result.clone()
    }

    fn output_path(&self) -> PathBuf {
        let settings = self.executor.settings();
        settings.work_dir.join(&self.id).join(&settings.result_file)
    }
}

/// First 16 hex chars, for log fields.
pub(crate) fn short(id: &str) -> &str {
    &id[..16.min(id.len())]
}
