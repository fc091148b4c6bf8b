//! Sandbox executor: runs an untrusted algorithm against a dataset.
//!
//! The algorithm is passed to the interpreter as an inline program:
//!
//!   <interpreter> <interpreter_args..> <algorithm> <dataset> <output_path>
//!
//! stdout and stderr are drained by two separate tasks. Both drains are
//! joined after the child exits and before either buffer is read. The
//! artifact is then cut out of stdout by [`crate::extract::extract`].

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use enclave_core::config::SandboxSettings;

use crate::extract::{extract, ExtractionError};

/// The algorithm process could not be run to a successful exit.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for algorithm process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("algorithm exited with {status}: {stderr}")]
    NonZeroExit { status: ExitStatus, stderr: String },
    #[error("algorithm exceeded {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("no artifact in algorithm output: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Runs algorithms in a child process, one process per call.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    settings: SandboxSettings,
}

impl SandboxExecutor {
    pub fn new(settings: SandboxSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    /// Execute `algorithm` with `dataset` and return the extracted artifact.
    ///
    /// The configured timeout, if any, covers spawn, run, and drain.
    pub async fn execute(
        &self,
        algorithm: &[u8],
        dataset: &[u8],
        output_path: &Path,
    ) -> Result<Bytes, SandboxError> {
        let stdout = match self.settings.timeout() {
            Some(limit) => tokio::time::timeout(limit, self.run(algorithm, dataset, output_path))
                .await
                .map_err(|_| ExecutionError::TimedOut(limit))??,
            None => self.run(algorithm, dataset, output_path).await?,
        };

        let artifact = extract(&stdout, self.settings.marker.as_bytes())?;
        Ok(Bytes::copy_from_slice(artifact))
    }

    /// Spawn the interpreter and return its full stdout on a zero exit.
    async fn run(
        &self,
        algorithm: &[u8],
        dataset: &[u8],
        output_path: &Path,
    ) -> Result<Vec<u8>, ExecutionError> {
        let program = &self.settings.interpreter;
        let mut child = Command::new(program)
            .args(&self.settings.interpreter_args)
            .arg(OsStr::from_bytes(algorithm))
            .arg(OsStr::from_bytes(dataset))
            .arg(output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                program: program.clone(),
                source,
            })?;

        let pid = child.id();
        let start = Instant::now();
        tracing::debug!(?pid, program = %program, "algorithm process spawned");

        // Both pipes are always configured above.
        let stdout_drain = drain(child.stdout.take());
        let stderr_drain = drain(child.stderr.take());

        let status = child.wait().await.map_err(ExecutionError::Wait)?;
        let stdout = join_drain(stdout_drain).await;
        let stderr = join_drain(stderr_drain).await;

        tracing::info!(
            ?pid,
            %status,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "algorithm process finished"
        );

        if !status.success() {
            return Err(ExecutionError::NonZeroExit {
                status,
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }
        Ok(stdout)
    }
}

/// Read a child pipe to EOF on its own task.
fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                tracing::warn!(error = %e, "algorithm pipe read failed");
            }
        }
        buf
    })
}

async fn join_drain(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    match handle.await {
        Ok(buf) => buf,
        Err(e) => {
            tracing::warn!(error = %e, "algorithm pipe drain task failed");
            Vec::new()
        }
    }
}
