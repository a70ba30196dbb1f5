//! Bearer credential storage and session resolution.
//!
//! The credential is one opaque string. Where it lives is a [`TokenStore`]
//! detail; every HTTP request and the push CONNECT frame read it fresh, and a
//! 401 anywhere clears it.

use std::path::PathBuf;

use corridor_types::UserId;
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::TOKEN_FILE;
use crate::http::HttpTransport;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum TokenStoreError {
    #[error("no config directory on this platform")]
    NoConfigDir,
    #[error("token store I/O: {0}")]
    Io(#[from] std::io::Error),
}

pub trait TokenStore: Send + Sync {
    /// The stored token, if any. Read failures count as "no token".
    fn load(&self) -> Option<String>;
    fn store(&self, token: &str) -> Result<(), TokenStoreError>;
    fn clear(&self) -> Result<(), TokenStoreError>;
}

/// Process-local store, for tests and `--token` overrides.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Mutex::new(token),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn store(&self, token: &str) -> Result<(), TokenStoreError> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        *self.token.lock() = None;
        Ok(())
    }
}

/// One file holding the token, trimmed on read.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$CONFIG_DIR/corridor/auth_token`.
    pub fn default_location() -> Result<Self, TokenStoreError> {
        let dir = dirs::config_dir().ok_or(TokenStoreError::NoConfigDir)?;
        Ok(Self::new(dir.join("corridor").join(TOKEN_FILE)))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => {
                let token = s.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read token");
                None
            }
        }
    }

    fn store(&self, token: &str) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Body of `GET /api/auth/me`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
}

/// Outcome of resolving who we are.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Authenticated(AuthUser),
    /// Backend reachable, no valid session.
    Anonymous,
    /// Unreachable, missing, or failing backend.
    Unavailable(TransportError),
}

impl SessionStatus {
    pub fn backend_available(&self) -> bool {
        !matches!(self, SessionStatus::Unavailable(_))
    }

    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            SessionStatus::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Fold an `/api/auth/me` result into a status.
    ///
    /// Unreachable, 404 and 5xx mean the backend is unavailable. Any other
    /// failure (401 included, which has already cleared the stored token)
    /// means reachable but anonymous.
    pub fn from_lookup(result: Result<AuthUser, TransportError>) -> Self {
        match result {
            Ok(user) => SessionStatus::Authenticated(user),
            Err(e) if e.is_unavailable() => SessionStatus::Unavailable(e),
            Err(e) => {
                debug!(error = %e, "no session");
                SessionStatus::Anonymous
            }
        }
    }
}

/// Resolve the current session. Without a stored token this is an
/// unauthenticated request that only establishes reachability.
pub async fn resolve_session(http: &HttpTransport) -> SessionStatus {
    let status = SessionStatus::from_lookup(http.current_user().await);
    match &status {
        SessionStatus::Authenticated(user) => info!(user_id = %user.id, "session resolved"),
        SessionStatus::Anonymous => info!("backend reachable, no session"),
        SessionStatus::Unavailable(e) => warn!(error = %e, "backend unavailable"),
    }
    status
}
