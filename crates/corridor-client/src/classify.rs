//! Push message classification.
//!
//! Decides what a decoded push message is, in this order:
//!
//! 1. Schema-B snapshot shape → full snapshot, whatever its `type` says.
//! 2. A direct-event `type` → snapshot / delta / request lifecycle / text.
//! 3. A broadcast `type` → lock / friendship handling.
//! 4. Anything else → discarded.
//!
//! Shape wins over tags only for the snapshot case: legacy snapshots arrive
//! without a discriminator and must still be recognized.

use corridor_types::{Broadcast, DirectEvent, Snapshot};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::normalize::{NormalizeError, decode_corridor_snapshot, is_corridor_snapshot};
use crate::reducer::{PresenceEvent, SnapshotOrigin};

/// Where a push message goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Snapshot(Snapshot),
    Direct(DirectEvent),
    Broadcast(Broadcast),
}

/// Why a push message was dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    NotAnObject,
    NoType,
    UnknownType(String),
    /// Recognized type, but the payload didn't decode.
    Malformed { kind: String, error: String },
    /// Snapshot shape matched, but a field didn't decode.
    InvalidSnapshot(NormalizeError),
}

impl DiscardReason {
    /// Unknown or untyped messages are expected noise; the rest point at a
    /// protocol mismatch worth a warning.
    pub fn is_silent(&self) -> bool {
        matches!(self, DiscardReason::NoType | DiscardReason::UnknownType(_))
    }
}

/// Classify one decoded push message.
pub fn classify(value: &Value) -> Result<Route, DiscardReason> {
    if !value.is_object() {
        return Err(DiscardReason::NotAnObject);
    }

    if is_corridor_snapshot(value) {
        return decode_corridor_snapshot(value)
            .map(Route::Snapshot)
            .map_err(DiscardReason::InvalidSnapshot);
    }

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Err(DiscardReason::NoType);
    };

    let malformed = |e: serde_json::Error| DiscardReason::Malformed {
        kind: kind.to_string(),
        error: e.to_string(),
    };

    if DirectEvent::is_type(kind) {
        return match serde_json::from_value::<DirectEvent>(value.clone()).map_err(malformed)? {
            DirectEvent::Snapshot(data) => Ok(Route::Snapshot(Snapshot { data })),
            direct => Ok(Route::Direct(direct)),
        };
    }

    if Broadcast::is_type(kind) {
        return serde_json::from_value::<Broadcast>(value.clone())
            .map(Route::Broadcast)
            .map_err(malformed);
    }

    Err(DiscardReason::UnknownType(kind.to_string()))
}

impl Route {
    /// The reducer event for this route. `None` for broadcasts that carry no
    /// transition of their own (joins, leaves, moves).
    pub fn into_event(self) -> Option<PresenceEvent> {
        match self {
            Route::Snapshot(snapshot) => Some(PresenceEvent::Snapshot {
                snapshot,
                origin: SnapshotOrigin::Push,
            }),
            Route::Direct(direct) => Some(match direct {
                DirectEvent::Snapshot(data) => PresenceEvent::Snapshot {
                    snapshot: Snapshot { data },
                    origin: SnapshotOrigin::Push,
                },
                DirectEvent::NeighborsUpdated(update) => PresenceEvent::NeighborsUpdated(update),
                DirectEvent::RequestIncoming(e) => PresenceEvent::RequestIncoming(e.from_user_id),
                DirectEvent::RequestCancelled(e) => PresenceEvent::RequestCancelled(e.from_user_id),
                DirectEvent::RequestAccepted(e) => PresenceEvent::RequestAccepted(e.by_user_id),
                DirectEvent::RequestRejected(e) => PresenceEvent::RequestRejected(e.by_user_id),
                DirectEvent::NeighborTextUpdated(e) => PresenceEvent::NeighborText {
                    user_id: e.user_id,
                    text: e.text,
                },
            }),
            Route::Broadcast(broadcast) => match broadcast {
                Broadcast::UserLocked(u) => Some(PresenceEvent::LockChanged {
                    user_id: u.user_id,
                    locked: true,
                }),
                Broadcast::UserUnlocked(u) => Some(PresenceEvent::LockChanged {
                    user_id: u.user_id,
                    locked: false,
                }),
                Broadcast::FriendshipCreated(pair) => Some(PresenceEvent::FriendshipCreated {
                    pair,
                    auto_lock: false,
                }),
                Broadcast::AutoLock(pair) => Some(PresenceEvent::FriendshipCreated {
                    pair,
                    auto_lock: true,
                }),
                Broadcast::UserJoined(_) | Broadcast::UserLeft(_) | Broadcast::UserMoved(_) => {
                    None
                }
            },
        }
    }
}

/// Decode a raw push body and classify it, logging whatever gets dropped.
pub fn event_from_push(body: &str) -> Option<PresenceEvent> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "failed to parse push message");
            return None;
        }
    };

    match classify(&value) {
        Ok(route) => {
            let event = route.into_event();
            if event.is_none() {
                debug!("push broadcast carries no transition, ignoring");
            }
            event
        }
        Err(reason) if reason.is_silent() => {
            debug!(?reason, "discarding push message");
            None
        }
        Err(reason) => {
            warn!(?reason, "dropping unrecognized push message");
            None
        }
    }
}
