//! Session actor: the single timeline every payload is folded on.
//!
//! ```text
//!   SessionHandle ──mpsc──▶ ┌──────────────────────────┐ ──watch──▶ renderers
//!   fetch tasks  ──mpsc──▶  │ SessionActor             │
//!   push loop    ──mpsc──▶  │ reduce(state, event)     │
//!                           └──────────────────────────┘
//! ```
//!
//! The actor owns the model. HTTP fetches run as spawned tasks whose results
//! come back as commands, so nothing blocks the timeline. After the
//! cancellation token fires, late fetch results are dropped.

use std::sync::Arc;

use corridor_types::{PresenceState, UserId};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classify::event_from_push;
use crate::normalize::normalize_snapshot;
use crate::reducer::{PresenceEvent, SnapshotOrigin, reduce};
use crate::socket::{ConnectionStatus, PushEvent};
use crate::transport::{PresenceTransport, TransportError};

/// Errors from the session handle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session shut down")]
    Shutdown,
}

enum SessionCommand {
    Refresh,
    SnapshotFetched(Result<Value, TransportError>),
    Apply(PresenceEvent),
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<PresenceState>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Subscribe to model updates. The receiver always holds the latest model.
    pub fn state(&self) -> watch::Receiver<PresenceState> {
        self.state.clone()
    }

    fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Shutdown);
        }
        self.tx.send(cmd).map_err(|_| SessionError::Shutdown)
    }

    /// Fetch a fresh snapshot over HTTP. Returns once the fetch is queued.
    pub fn refresh(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Refresh)
    }

    pub fn identify(&self, id: Option<UserId>, name: Option<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::Apply(PresenceEvent::Identify { id, name }))
    }

    pub fn reset(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Apply(PresenceEvent::Reset))
    }

    /// Stop the timeline. Fetches still in flight are discarded.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

struct SessionActor {
    transport: Arc<dyn PresenceTransport>,
    state: watch::Sender<PresenceState>,
    /// Weak so that dropping every handle ends the actor.
    commands: mpsc::WeakUnboundedSender<SessionCommand>,
    cancel: CancellationToken,
    was_connected: bool,
}

impl SessionActor {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<SessionCommand>,
        mut push: Option<mpsc::UnboundedReceiver<PushEvent>>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    log::debug!("Session shutting down: cancelled");
                    break;
                }
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        log::debug!("Session shutting down: all handles dropped");
                        break;
                    }
                },
                Some(event) = next_push(&mut push) => self.handle_push(event),
            }
        }
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Refresh => self.spawn_fetch(),
            SessionCommand::SnapshotFetched(result) => self.on_fetched(result),
            SessionCommand::Apply(event) => self.apply(event),
        }
    }

    fn handle_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::Message(body) => {
                if let Some(event) = event_from_push(&body) {
                    self.apply(event);
                }
            }
            PushEvent::Status(ConnectionStatus::Connected) => {
                log::info!("Push channel connected");
                // first connect is covered by the initial fetch
                if self.was_connected {
                    self.spawn_fetch();
                }
                self.was_connected = true;
            }
            PushEvent::Status(ConnectionStatus::Reconnecting { attempt, reason }) => {
                log::warn!("Push channel lost ({reason}), attempt {attempt} pending");
            }
            PushEvent::Status(status) => log::debug!("Push channel status: {status:?}"),
        }
    }

    fn spawn_fetch(&self) {
        let Some(tx) = self.commands.upgrade() else {
            return;
        };
        let transport = self.transport.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = transport.fetch_snapshot() => result,
            };
            let _ = tx.send(SessionCommand::SnapshotFetched(result));
        });
    }

    fn on_fetched(&mut self, result: Result<Value, TransportError>) {
        if self.cancel.is_cancelled() {
            log::debug!("Dropping snapshot fetched after shutdown");
            return;
        }
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Snapshot fetch failed: {e}");
                return;
            }
        };
        match normalize_snapshot(&value) {
            Ok(snapshot) => self.apply(PresenceEvent::Snapshot {
                snapshot,
                origin: SnapshotOrigin::Http,
            }),
            Err(e) => log::warn!("Ignoring snapshot: {e}"),
        }
    }

    /// Fold one event; watchers are woken only when the model changed.
    fn apply(&mut self, event: PresenceEvent) {
        let kind = event.kind();
        let changed = self.state.send_if_modified(|state| {
            let next = reduce(state, &event);
            if next == *state {
                return false;
            }
            *state = next;
            true
        });
        log::trace!("Applied {kind} (changed: {changed})");
    }
}

async fn next_push(push: &mut Option<mpsc::UnboundedReceiver<PushEvent>>) -> Option<PushEvent> {
    match push {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Spawn a session actor on the current runtime.
///
/// `push` is the event stream from [`spawn_push`](crate::socket::spawn_push);
/// `None` runs HTTP-only. The actor stops when `cancel` fires or every
/// handle is dropped.
pub fn spawn_session(
    transport: Arc<dyn PresenceTransport>,
    push: Option<mpsc::UnboundedReceiver<PushEvent>>,
    cancel: CancellationToken,
) -> (SessionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(PresenceState::default());
    let actor = SessionActor {
        transport,
        state: state_tx,
        commands: tx.downgrade(),
        cancel: cancel.clone(),
        was_connected: false,
    };
    let task = tokio::spawn(actor.run(rx, push));
    let handle = SessionHandle {
        tx,
        state: state_rx,
        cancel,
    };
    (handle, task)
}
