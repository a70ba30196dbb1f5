//! Client configuration constants.
//!
//! Defaults for [`ClientConfig`](crate::ClientConfig) and the fixed endpoint
//! layout of the presence backend.

use std::time::Duration;

/// Default backend base URL for local development.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Snapshot fetch endpoint.
pub const SNAPSHOT_PATH: &str = "/api/presence/snapshot";

/// Current-user endpoint, also used as the unauthenticated reachability check.
pub const AUTH_ME_PATH: &str = "/api/auth/me";

/// WebSocket path of the STOMP broker, relative to the base URL host.
pub const PUSH_PATH: &str = "/ws";

/// Per-user queue the server pushes snapshots and events to.
pub const SNAPSHOT_DESTINATION: &str = "/user/queue/snapshot";

/// Outbound destination for my own text updates.
pub const TEXT_DESTINATION: &str = "/app/text";

/// Fixed delay between push channel reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Heartbeat we promise to send.
pub const HEARTBEAT_OUTGOING: Duration = Duration::from_millis(10000);

/// Heartbeat we ask the server to send. The connection is declared dead after
/// twice this with no traffic.
pub const HEARTBEAT_INCOMING: Duration = Duration::from_millis(10000);

/// Timeout for every HTTP request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the WebSocket handshake plus the STOMP CONNECTED reply.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Credential file name under the corridor config directory.
pub const TOKEN_FILE: &str = "auth_token";

/// Config file name under the corridor config directory.
pub const CONFIG_FILE: &str = "client.ron";
