//! HTTP side of the transport: snapshot fetch, actions, and `/api/auth/me`.

use std::sync::Arc;

use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{AuthUser, TokenStore};
use crate::config::ClientConfig;
use crate::constants::{AUTH_ME_PATH, SNAPSHOT_PATH};
use crate::transport::{Action, TransportError};

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: ClientConfig,
    tokens: Arc<dyn TokenStore>,
}

impl HttpTransport {
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, TransportError> {
        config
            .base()
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.config
            .http_url(path)
            .map_err(|e| TransportError::Unreachable(e.to_string()))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.load() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn clear_token(&self) {
        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "failed to clear stored token");
        }
    }

    /// Send a request and map the outcome. `Ok(None)` for an empty or
    /// non-JSON success body. A 401 clears the stored token.
    async fn execute(&self, request: RequestBuilder) -> Result<Option<Value>, TransportError> {
        let response = self
            .authorize(request)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let err = TransportError::from_status(status.as_u16());
            if err == TransportError::Unauthorized {
                debug!("401 from backend, clearing token");
                self.clear_token();
            }
            return Err(err);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(serde_json::from_slice(&bytes).ok())
    }

    async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        let url = self.url(path)?;
        self.execute(self.client.get(url))
            .await?
            .ok_or_else(|| TransportError::Malformed(format!("{path}: expected a JSON body")))
    }

    pub async fn fetch_snapshot(&self) -> Result<Value, TransportError> {
        self.get_json(SNAPSHOT_PATH).await
    }

    pub async fn post_action(&self, action: Action) -> Result<Option<Value>, TransportError> {
        let path = action.path();
        debug!(%path, "posting action");
        let url = self.url(&path)?;
        self.execute(self.client.post(url)).await
    }

    /// `GET /api/auth/me`, authenticated when a token is stored.
    pub async fn current_user(&self) -> Result<AuthUser, TransportError> {
        let body = self.get_json(AUTH_ME_PATH).await?;
        serde_json::from_value(body).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}
