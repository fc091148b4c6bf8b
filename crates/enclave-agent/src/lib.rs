//! enclave-agent: the in-VM side of a computation.
//!
//! A [`SessionStore`] hosts any number of [`ComputationSession`]s. Each
//! session stages a computation through its [`StateMachine`], runs the
//! algorithm with the [`SandboxExecutor`], and caches the extracted artifact.

pub mod extract;
pub mod sandbox;
pub mod session;
pub mod session_store;
pub mod state;

pub use extract::{extract, ExtractionError};
pub use sandbox::{ExecutionError, SandboxError, SandboxExecutor};
pub use session::{ComputationSession, SessionError};
pub use session_store::SessionStore;
pub use state::{Event, EventLoop, ProtocolState, StateMachine};
