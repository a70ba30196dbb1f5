//! Corridor presence client library
//!
//! Reconciles a full-state HTTP snapshot with a STOMP push stream into one
//! [`PresenceState`](corridor_types::PresenceState), and turns user intents
//! into requests without ever updating that state optimistically.
//!
//! ```text
//!   HTTP snapshot ─┐
//!                  ├─▶ normalize/classify ─▶ reduce ─▶ watch<PresenceState>
//!   push MESSAGE ──┘                                         │
//!                                                            ▼
//!   CommandDispatcher ◀──────────── preconditions ◀──── renderers
//!         │
//!         └─▶ POST /api/... and SEND /app/text
//! ```

pub mod auth;
pub mod classify;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod draft;
pub mod http;
pub mod normalize;
pub mod reducer;
pub mod session;
pub mod socket;
pub mod stomp;
pub mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use auth::{
    AuthUser, FileTokenStore, MemoryTokenStore, SessionStatus, TokenStore, TokenStoreError,
    resolve_session,
};
pub use classify::{DiscardReason, Route, classify, event_from_push};
pub use config::{ClientConfig, ConfigError};
pub use dispatch::{CommandDispatcher, CommandOutcome, MoveOutcome, Precondition};
pub use draft::TextDraft;
pub use http::HttpTransport;
pub use normalize::{NormalizeError, normalize_snapshot};
pub use reducer::{PresenceEvent, SnapshotOrigin, apply, reduce};
pub use session::{SessionError, SessionHandle, spawn_session};
pub use socket::{ConnectionStatus, PushChannel, PushEvent, PushHandle, spawn_push};
pub use stomp::StompError;
pub use transport::{Action, PresenceTransport, TransportError};

/// HTTP for snapshots and actions, push channel for outbound text.
#[derive(Clone)]
pub struct LiveTransport {
    http: HttpTransport,
    push: PushHandle,
}

impl LiveTransport {
    pub fn new(http: HttpTransport, push: PushHandle) -> Self {
        Self { http, push }
    }
}

#[async_trait]
impl PresenceTransport for LiveTransport {
    async fn fetch_snapshot(&self) -> Result<Value, TransportError> {
        self.http.fetch_snapshot().await
    }

    async fn post_action(&self, action: Action) -> Result<Option<Value>, TransportError> {
        self.http.post_action(action).await
    }

    fn publish_text(&self, text: &str) -> Result<(), TransportError> {
        self.push.publish_text(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("backend unavailable: {0}")]
    Unavailable(TransportError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// A connected client: session timeline, dispatcher, and push channel.
pub struct CorridorClient {
    pub status: SessionStatus,
    pub session: SessionHandle,
    pub dispatcher: CommandDispatcher,
    pub push: PushHandle,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl CorridorClient {
    /// Cancel the session and push channel and wait for both to finish.
    /// The push channel unsubscribes and disconnects on the way out.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "client task ended abnormally");
            }
        }
    }
}

/// Resolve the session, then wire HTTP, push, session, and dispatcher, and
/// queue the initial snapshot fetch.
///
/// Fails with [`ConnectError::Unavailable`] when the backend can't be
/// reached; an anonymous session still connects.
pub async fn connect(
    config: ClientConfig,
    tokens: Arc<dyn TokenStore>,
) -> Result<CorridorClient, ConnectError> {
    config.base()?;
    let http = HttpTransport::new(config.clone(), tokens.clone())?;

    let status = resolve_session(&http).await;
    if let SessionStatus::Unavailable(e) = &status {
        return Err(ConnectError::Unavailable(e.clone()));
    }

    let cancel = CancellationToken::new();
    let push = spawn_push(&config, tokens, cancel.child_token())?;
    let transport: Arc<dyn PresenceTransport> =
        Arc::new(LiveTransport::new(http, push.handle.clone()));

    let (session, session_task) =
        spawn_session(transport.clone(), Some(push.events), cancel.clone());
    if let Some(user) = status.user() {
        let _ = session.identify(Some(user.id), user.username.clone());
    }
    let _ = session.refresh();

    let dispatcher = CommandDispatcher::new(transport, session.state());

    Ok(CorridorClient {
        status,
        session,
        dispatcher,
        push: push.handle,
        cancel,
        tasks: vec![session_task, push.task],
    })
}
