//! Transport seam between the core and the network.
//!
//! [`PresenceTransport`] is everything the dispatcher and session need from
//! the outside world: fetch a snapshot, post an action, publish my text. The
//! live implementation is [`LiveTransport`](crate::LiveTransport); tests use
//! an in-memory recorder.

use async_trait::async_trait;
use corridor_types::{MoveResult, Side};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Transport-level failures. None of these ever reach the reducer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection-level failure: DNS, refused, reset, timeout.
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    /// 401. The stored credential has already been cleared.
    #[error("unauthorized")]
    Unauthorized,
    /// 409. The action is currently invalid; retry after the next update.
    #[error("conflict")]
    Conflict,
    #[error("not found")]
    NotFound,
    #[error("server error (status {0})")]
    Server(u16),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    /// Outbound push while the channel isn't connected.
    #[error("push channel not active")]
    PushInactive,
}

impl TransportError {
    /// Map a non-success HTTP status onto the taxonomy.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => TransportError::Unauthorized,
            404 => TransportError::NotFound,
            409 => TransportError::Conflict,
            s if s >= 500 => TransportError::Server(s),
            s => TransportError::Status(s),
        }
    }

    /// Whether this means "backend unavailable" rather than "no session" or
    /// "try again".
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            TransportError::Unreachable(_) | TransportError::NotFound | TransportError::Server(_)
        )
    }
}

/// State-changing endpoints. Each returns 2xx on success.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    MoveLeft,
    MoveRight,
    Lock,
    Unlock,
    Leave,
    SendRequest(Side),
    CancelRequest(Side),
    AcceptRequest(Side),
    RejectRequest(Side),
}

impl Action {
    pub fn path(&self) -> String {
        match self {
            Action::MoveLeft => "/api/presence/moveLeft".to_string(),
            Action::MoveRight => "/api/presence/moveRight".to_string(),
            Action::Lock => "/api/presence/lock".to_string(),
            Action::Unlock => "/api/presence/unlock".to_string(),
            Action::Leave => "/api/presence/leave".to_string(),
            Action::SendRequest(side) => format!("/api/requests/send/{side}"),
            Action::CancelRequest(side) => format!("/api/requests/cancel/{side}"),
            Action::AcceptRequest(side) => format!("/api/requests/accept/{side}"),
            Action::RejectRequest(side) => format!("/api/requests/reject/{side}"),
        }
    }

    pub fn move_toward(side: Side) -> Self {
        match side {
            Side::Left => Action::MoveLeft,
            Side::Right => Action::MoveRight,
        }
    }
}

#[async_trait]
pub trait PresenceTransport: Send + Sync {
    /// Fetch the raw snapshot JSON. Normalization happens in the core.
    async fn fetch_snapshot(&self) -> Result<Value, TransportError>;

    /// POST an action. `Ok(None)` for an empty or non-JSON success body.
    async fn post_action(&self, action: Action) -> Result<Option<Value>, TransportError>;

    /// Queue my text for the push channel's outbound path. Never waits for
    /// confirmation.
    fn publish_text(&self, text: &str) -> Result<(), TransportError>;
}

#[derive(Deserialize)]
struct WrappedMove {
    #[serde(default)]
    result: Option<MoveResult>,
}

/// Decode a move endpoint's success body: either a bare [`MoveResult`] or an
/// `{ ok, result }` wrapper. A wrapper without a result is malformed.
pub fn parse_move_result(body: Option<Value>) -> Result<MoveResult, TransportError> {
    let body = body.ok_or_else(|| TransportError::Malformed("empty move response".into()))?;
    if body.get("result").is_some() {
        let wrapped: WrappedMove = serde_json::from_value(body)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        return wrapped
            .result
            .ok_or_else(|| TransportError::Malformed("move response without result".into()));
    }
    serde_json::from_value(body).map_err(|e| TransportError::Malformed(e.to_string()))
}
