//! Push channel event payloads.
//!
//! Every tagged message is `{ "type": "<TYPE>", "data": { … } }`. Two
//! families share the channel:
//!
//! - [`DirectEvent`]: addressed to this user (snapshot, neighbor deltas,
//!   request lifecycle, neighbor text).
//! - [`Broadcast`]: fan-out state changes about one or two users (locks,
//!   friendships, joins/leaves/moves).
//!
//! Schema-B snapshots also travel this channel but carry no tag; they are
//! recognized by shape before any of these types are consulted.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::presence::{NeighborRef, WireNeighbor};
use crate::snapshot::SnapshotData;

// ============================================================================
// Direct events
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectEvent {
    Snapshot(SnapshotData),
    NeighborsUpdated(NeighborsUpdated),
    RequestIncoming(RequestFrom),
    RequestCancelled(RequestFrom),
    RequestAccepted(RequestBy),
    RequestRejected(RequestBy),
    NeighborTextUpdated(NeighborTextUpdated),
}

impl DirectEvent {
    /// Wire tags of every direct event.
    pub const TYPES: [&'static str; 7] = [
        "SNAPSHOT",
        "NEIGHBORS_UPDATED",
        "REQUEST_INCOMING",
        "REQUEST_CANCELLED",
        "REQUEST_ACCEPTED",
        "REQUEST_REJECTED",
        "NEIGHBOR_TEXT_UPDATED",
    ];

    pub fn is_type(tag: &str) -> bool {
        Self::TYPES.contains(&tag)
    }
}

/// Partial corridor update.
///
/// Each side is tri-state: outer `None` = not mentioned (keep what we have),
/// `Some(None)` = nobody there now, `Some(Some(_))` = replace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireNeighborsUpdated")]
pub struct NeighborsUpdated {
    pub my_index: u32,
    pub corridor_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<Option<NeighborRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<Option<NeighborRef>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireNeighborsUpdated {
    my_index: u32,
    corridor_size: u32,
    #[serde(default, deserialize_with = "crate::double_option")]
    left: Option<Option<WireNeighbor>>,
    #[serde(default, deserialize_with = "crate::double_option")]
    right: Option<Option<WireNeighbor>>,
}

impl From<WireNeighborsUpdated> for NeighborsUpdated {
    fn from(wire: WireNeighborsUpdated) -> Self {
        let side = |s: Option<Option<WireNeighbor>>| s.map(|n| n.and_then(WireNeighbor::into_ref));
        Self {
            my_index: wire.my_index,
            corridor_size: wire.corridor_size,
            left: side(wire.left),
            right: side(wire.right),
        }
    }
}

/// Request lifecycle step initiated by the other party.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFrom {
    pub from_user_id: UserId,
}

/// Request lifecycle step decided by the other party.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBy {
    pub by_user_id: UserId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborTextUpdated {
    pub user_id: UserId,
    pub text: String,
}

// ============================================================================
// Broadcasts
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Broadcast {
    UserJoined(UserJoined),
    UserLeft(UserLeft),
    UserLocked(UserRef),
    UserUnlocked(UserRef),
    UserMoved(MoveResult),
    FriendshipCreated(UserPair),
    AutoLock(UserPair),
}

impl Broadcast {
    /// Wire tags of every broadcast.
    pub const TYPES: [&'static str; 7] = [
        "USER_JOINED",
        "USER_LEFT",
        "USER_LOCKED",
        "USER_UNLOCKED",
        "USER_MOVED",
        "FRIENDSHIP_CREATED",
        "AUTO_LOCK",
    ];

    pub fn is_type(tag: &str) -> bool {
        Self::TYPES.contains(&tag)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub user_id: UserId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoined {
    pub user_id: UserId,
    pub index: u32,
    pub corridor_size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeft {
    pub user_id: UserId,
    pub corridor_size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPair {
    #[serde(rename = "userId1")]
    pub user_id1: UserId,
    #[serde(rename = "userId2")]
    pub user_id2: UserId,
}

impl UserPair {
    pub fn ids(&self) -> [UserId; 2] {
        [self.user_id1, self.user_id2]
    }
}

/// A completed move. Also the success body of the move endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResult {
    pub user_id: UserId,
    pub from_index: u32,
    pub to_index: u32,
    pub corridor_size: u32,
}
