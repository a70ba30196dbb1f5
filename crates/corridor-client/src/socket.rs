//! Push channel: STOMP over WebSocket with fixed-delay reconnect.
//!
//! ```text
//!   PushHandle ──outbound text──▶ push loop ──MESSAGE bodies──▶ session
//!        │                          │  ▲
//!        └──── status (watch) ◀─────┘  └── heartbeats both ways
//! ```
//!
//! The loop owns the socket. It connects, subscribes, forwards every
//! `MESSAGE` body unparsed, and on any loss waits the configured delay and
//! starts over. Cancelling the token unsubscribes, disconnects, and ends the
//! loop.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::auth::TokenStore;
use crate::config::{ClientConfig, ConfigError};
use crate::constants::CONNECT_TIMEOUT;
use crate::stomp::{Command, Frame, HeartBeat, Inbound, StompError};
use crate::transport::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SUBSCRIPTION_ID: &str = "sub-0";
const DISCONNECT_RECEIPT: &str = "disconnect-0";
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Push channel lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting { attempt: u32 },
    Connected,
    /// Lost or failed; the next attempt starts after the reconnect delay.
    Reconnecting { attempt: u32, reason: String },
    /// Torn down. Terminal.
    Disconnected,
}

/// What the push loop hands to the session timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushEvent {
    /// Raw `MESSAGE` body.
    Message(String),
    Status(ConnectionStatus),
}

/// Cloneable outbound side of the push channel.
#[derive(Clone)]
pub struct PushHandle {
    outbound: mpsc::UnboundedSender<String>,
    status: watch::Receiver<ConnectionStatus>,
}

impl PushHandle {
    pub fn is_connected(&self) -> bool {
        *self.status.borrow() == ConnectionStatus::Connected
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Queue `{ "text": ... }` for the text destination. Fails with
    /// [`TransportError::PushInactive`] unless connected.
    pub fn publish_text(&self, text: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            warn!("push channel inactive, dropping text update");
            return Err(TransportError::PushInactive);
        }
        let body = serde_json::json!({ "text": text }).to_string();
        self.outbound.send(body).map_err(|_| {
            warn!("push loop gone, dropping text update");
            TransportError::PushInactive
        })
    }
}

/// A running push channel.
pub struct PushChannel {
    pub handle: PushHandle,
    pub events: mpsc::UnboundedReceiver<PushEvent>,
    pub task: JoinHandle<()>,
}

/// Spawn the push loop. It runs until `cancel` fires.
pub fn spawn_push(
    config: &ClientConfig,
    tokens: Arc<dyn TokenStore>,
    cancel: CancellationToken,
) -> Result<PushChannel, ConfigError> {
    let url = config.push_url()?;
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting { attempt: 1 });

    let push = PushLoop {
        url,
        config: config.clone(),
        tokens,
        events: events_tx,
        status: status_tx,
        outbound: outbound_rx,
        cancel,
    };
    let task = tokio::spawn(push.run());

    Ok(PushChannel {
        handle: PushHandle {
            outbound: outbound_tx,
            status: status_rx,
        },
        events: events_rx,
        task,
    })
}

struct PushLoop {
    url: Url,
    config: ClientConfig,
    tokens: Arc<dyn TokenStore>,
    events: mpsc::UnboundedSender<PushEvent>,
    status: watch::Sender<ConnectionStatus>,
    outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl PushLoop {
    async fn run(mut self) {
        let mut attempt = 1;
        loop {
            self.set_status(ConnectionStatus::Connecting { attempt });

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.handshake() => result,
            };

            let reason = match connected {
                Ok((ws, heart_beat)) => {
                    info!(url = %self.url, ?heart_beat, "push channel connected");
                    attempt = 1;
                    self.set_status(ConnectionStatus::Connected);
                    match self.serve(ws, heart_beat).await {
                        Ok(()) => break,
                        Err(e) => e.to_string(),
                    }
                }
                Err(e) => e.to_string(),
            };

            if self.cancel.is_cancelled() {
                break;
            }
            warn!(
                %reason,
                delay = ?self.config.reconnect_delay(),
                "push channel down, will reconnect"
            );
            attempt += 1;
            self.set_status(ConnectionStatus::Reconnecting { attempt, reason });

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.config.reconnect_delay()) => {}
            }
        }
        self.set_status(ConnectionStatus::Disconnected);
        debug!("push loop exited");
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status.clone());
        let _ = self.events.send(PushEvent::Status(status));
    }

    async fn handshake(&self) -> Result<(WsStream, HeartBeat), StompError> {
        let (mut ws, _) = timeout(CONNECT_TIMEOUT, connect_async(self.url.as_str()))
            .await
            .map_err(|_| StompError::HandshakeTimeout)??;

        let requested = HeartBeat::new(
            self.config.heartbeat_outgoing_ms,
            self.config.heartbeat_incoming_ms,
        );
        let host = self.url.host_str().unwrap_or("localhost");
        let token = self.tokens.load();
        let connect = Frame::connect(host, token.as_deref(), requested);
        ws.send(Message::text(connect.encode())).await?;

        let connected = timeout(CONNECT_TIMEOUT, wait_connected(&mut ws))
            .await
            .map_err(|_| StompError::HandshakeTimeout)??;
        let offered = connected
            .get("heart-beat")
            .and_then(HeartBeat::parse)
            .unwrap_or_default();

        let subscribe = Frame::subscribe(SUBSCRIPTION_ID, &self.config.subscribe_destination);
        ws.send(Message::text(subscribe.encode())).await?;
        debug!(destination = %self.config.subscribe_destination, "subscribed");

        Ok((ws, HeartBeat::negotiate(requested, offered)))
    }

    /// Pump one live connection. `Ok(())` means cancelled and torn down;
    /// `Err` means the connection was lost.
    async fn serve(&mut self, mut ws: WsStream, heart_beat: HeartBeat) -> Result<(), StompError> {
        let stale = discard_queued(&mut self.outbound);
        if stale > 0 {
            debug!(stale, "discarded text updates queued before reconnect");
        }

        let beat_every = Duration::from_millis(heart_beat.outgoing);
        let dead_after = Duration::from_millis(heart_beat.incoming) * 2;
        let mut next_beat = Instant::now() + beat_every;
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    teardown(&mut ws).await;
                    return Ok(());
                }
                msg = ws.next() => {
                    let msg = msg.ok_or(StompError::Closed)??;
                    last_seen = Instant::now();
                    self.on_message(msg)?;
                }
                Some(body) = self.outbound.recv() => {
                    let frame = Frame::send_json(&self.config.text_destination, body);
                    ws.send(Message::text(frame.encode())).await?;
                    next_beat = Instant::now() + beat_every;
                }
                _ = sleep_until(next_beat), if !beat_every.is_zero() => {
                    trace!("heartbeat");
                    ws.send(Message::text("\n")).await?;
                    next_beat = Instant::now() + beat_every;
                }
                _ = sleep_until(last_seen + dead_after), if !dead_after.is_zero() => {
                    return Err(StompError::HeartbeatTimeout(dead_after));
                }
            }
        }
    }

    fn on_message(&self, msg: Message) -> Result<(), StompError> {
        let inbound = match decode_message(msg) {
            Ok(Some(inbound)) => inbound,
            Ok(None) => return Ok(()),
            Err(StompError::Closed) => return Err(StompError::Closed),
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return Ok(());
            }
        };

        let Inbound::Frame(frame) = inbound else {
            trace!("heartbeat received");
            return Ok(());
        };

        match frame.command {
            Command::Message => {
                let _ = self.events.send(PushEvent::Message(frame.body));
            }
            Command::Error => return Err(StompError::Rejected(error_message(&frame))),
            Command::Receipt => debug!(receipt = ?frame.get("receipt-id"), "receipt"),
            other => debug!(command = %other, "ignoring frame"),
        }
        Ok(())
    }
}

/// Drop text queued for a connection that no longer exists.
fn discard_queued(outbound: &mut mpsc::UnboundedReceiver<String>) -> usize {
    let mut stale = 0;
    while outbound.try_recv().is_ok() {
        stale += 1;
    }
    stale
}

/// Read frames until CONNECTED. An ERROR frame is a rejection.
async fn wait_connected(ws: &mut WsStream) -> Result<Frame, StompError> {
    while let Some(msg) = ws.next().await {
        match decode_message(msg?)? {
            Some(Inbound::Frame(frame)) if frame.command == Command::Connected => return Ok(frame),
            Some(Inbound::Frame(frame)) if frame.command == Command::Error => {
                return Err(StompError::Rejected(error_message(&frame)));
            }
            Some(Inbound::Frame(frame)) => {
                debug!(command = %frame.command, "ignoring frame before CONNECTED");
            }
            Some(Inbound::Heartbeat) | None => {}
        }
    }
    Err(StompError::Closed)
}

/// `Ok(None)` for control messages that carry no STOMP payload.
fn decode_message(msg: Message) -> Result<Option<Inbound>, StompError> {
    match msg {
        Message::Text(text) => Frame::decode(text.as_str()).map(Some),
        Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => Frame::decode(text).map(Some),
            Err(e) => {
                warn!(error = %e, "non-UTF-8 binary frame");
                Ok(None)
            }
        },
        Message::Close(_) => Err(StompError::Closed),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(None),
    }
}

fn error_message(frame: &Frame) -> String {
    frame
        .get("message")
        .map(str::to_string)
        .unwrap_or_else(|| frame.body.clone())
}

async fn teardown(ws: &mut WsStream) {
    let goodbye = async {
        ws.send(Message::text(Frame::unsubscribe(SUBSCRIPTION_ID).encode())).await?;
        ws.send(Message::text(Frame::disconnect(DISCONNECT_RECEIPT).encode())).await?;
        ws.close(None).await
    };
    match timeout(TEARDOWN_TIMEOUT, goodbye).await {
        Ok(Ok(())) => debug!("push channel closed"),
        Ok(Err(e)) => debug!(error = %e, "push channel close failed"),
        Err(_) => debug!("push channel close timed out"),
    }
}
