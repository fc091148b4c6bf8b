//! Protocol state machine: orders the staging of one computation.
//!
//!   Idle ─start→ ReceivingManifests ─manifestsReceived→ ReceivingAlgorithms
//!        ─algorithmsReceived→ ReceivingData ─dataReceived→ Running
//!        ─runComplete→ ResultsReady ─resultsConsumed→ Complete
//!
//! Any other (state, event) pair is ignored. Duplicate and out-of-order
//! deliveries are tolerated this way rather than reported.
//!
//! The authoritative state lives in an [`EventLoop`] task. Everything else
//! holds a [`StateMachine`] handle, which can only enqueue events and read a
//! snapshot. The loop ends on shutdown or once every handle is dropped;
//! events still queued at that point are discarded.

use tokio::sync::{broadcast, mpsc, oneshot, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolState {
    Idle,
    ReceivingManifests,
    ReceivingAlgorithms,
    ReceivingData,
    Running,
    ResultsReady,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Start,
    ManifestsReceived,
    AlgorithmsReceived,
    DataReceived,
    RunComplete,
    ResultsConsumed,
}

impl ProtocolState {
    pub const ALL: [ProtocolState; 7] = [
        ProtocolState::Idle,
        ProtocolState::ReceivingManifests,
        ProtocolState::ReceivingAlgorithms,
        ProtocolState::ReceivingData,
        ProtocolState::Running,
        ProtocolState::ResultsReady,
        ProtocolState::Complete,
    ];

    /// Next state for `event`, or `None` if the pair is not a transition.
    pub fn on(self, event: Event) -> Option<ProtocolState> {
        use Event as E;
        use ProtocolState as S;
        match (self, event) {
            (S::Idle, E::Start) => Some(S::ReceivingManifests),
            (S::ReceivingManifests, E::ManifestsReceived) => Some(S::ReceivingAlgorithms),
            (S::ReceivingAlgorithms, E::AlgorithmsReceived) => Some(S::ReceivingData),
            (S::ReceivingData, E::DataReceived) => Some(S::Running),
            (S::Running, E::RunComplete) => Some(S::ResultsReady),
            (S::ResultsReady, E::ResultsConsumed) => Some(S::Complete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ReceivingManifests => "receiving_manifests",
            Self::ReceivingAlgorithms => "receiving_algorithms",
            Self::ReceivingData => "receiving_data",
            Self::Running => "running",
            Self::ResultsReady => "results_ready",
            Self::Complete => "complete",
        }
    }
}

impl Event {
    pub const ALL: [Event; 6] = [
        Event::Start,
        Event::ManifestsReceived,
        Event::AlgorithmsReceived,
        Event::DataReceived,
        Event::RunComplete,
        Event::ResultsConsumed,
    ];
}

impl std::fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Command {
    Event(Event),
    /// Answered once every command queued before it has been handled.
    Flush(oneshot::Sender<()>),
}

/// Handle to a running state machine.
#[derive(Clone)]
pub struct StateMachine {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ProtocolState>,
}

/// Owner of the authoritative state. Drive it with [`EventLoop::run`].
pub struct EventLoop {
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ProtocolState>,
}

impl StateMachine {
    /// Create a machine starting at `Idle`.
    pub fn new() -> (Self, EventLoop) {
        Self::with_initial(ProtocolState::Idle)
    }

    /// Create a machine starting at `initial`.
    pub fn with_initial(initial: ProtocolState) -> (Self, EventLoop) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(initial);
        (
            Self {
                commands: cmd_tx,
                state: state_rx,
            },
            EventLoop {
                commands: cmd_rx,
                state: state_tx,
            },
        )
    }

    /// Create a machine and spawn its loop on the current runtime.
    pub fn spawn(initial: ProtocolState, shutdown: broadcast::Receiver<()>) -> Self {
        let (machine, event_loop) = Self::with_initial(initial);
        tokio::spawn(event_loop.run(shutdown));
        machine
    }

    /// Enqueue an event. Never blocks. Events sent after the loop has
    /// stopped are dropped.
    pub fn send_event(&self, event: Event) {
        if self.commands.send(Command::Event(event)).is_err() {
            tracing::trace!(?event, "state machine stopped, event dropped");
        }
    }

    /// Current state as last published by the loop.
    pub fn state(&self) -> ProtocolState {
        *self.state.borrow()
    }

    /// Wait until every event sent before this call has been processed.
    /// Returns immediately if the loop has stopped.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

impl EventLoop {
    /// Process events in FIFO order until `shutdown` fires or every
    /// [`StateMachine`] handle is dropped.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Event(event)) => self.apply(event),
                    Some(Command::Flush(done)) => {
                        let _ = done.send(());
                    }
                    None => break,
                },
            }
        }
        let state = *self.state.borrow();
        tracing::debug!(%state, "state machine loop stopped");
    }

    fn apply(&mut self, event: Event) {
        let current = *self.state.borrow();
        match current.on(event) {
            Some(next) => {
                self.state.send_replace(next);
                tracing::debug!(from = %current, to = %next, ?event, "protocol transition");
            }
            None => {
                tracing::trace!(state = %current, ?event, "event ignored");
            }
        }
    }
}
