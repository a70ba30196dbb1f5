//! The canonical presence model.
//!
//! `PresenceState` is the one shape every client component agrees on: both
//! snapshot schemas normalize into it, every push event folds onto it, and
//! renderers read nothing else.
//!
//! A side with no occupant is `None`, never a reference with empty fields.
//! "Nobody there" and "somebody there who hasn't written anything" are
//! different states and stay distinguishable.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::ids::UserId;

/// Which side of me a neighbor occupies.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];
}

/// One occupied side, as the server last described it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborRef {
    pub user_id: UserId,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub friend: bool,
    /// Free-text note. `None` = the occupant hasn't sent any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub request_to_me: bool,
    #[serde(default)]
    pub request_from_me: bool,
}

impl NeighborRef {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            locked: false,
            friend: false,
            text: None,
            request_to_me: false,
            request_from_me: false,
        }
    }
}

/// Neighbor object as it appears on the wire, where the id may be missing.
///
/// Converted with [`WireNeighbor::into_ref`]; a missing id means the side is
/// empty.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNeighbor {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub friend: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub request_to_me: bool,
    #[serde(default)]
    pub request_from_me: bool,
}

impl WireNeighbor {
    pub fn into_ref(self) -> Option<NeighborRef> {
        let user_id = self.user_id?;
        Some(NeighborRef {
            user_id,
            locked: self.locked,
            friend: self.friend,
            text: self.text,
            request_to_me: self.request_to_me,
            request_from_me: self.request_from_me,
        })
    }
}

#[derive(Deserialize)]
struct WireNeighbors {
    #[serde(default)]
    left: Option<WireNeighbor>,
    #[serde(default)]
    right: Option<WireNeighbor>,
}

impl From<WireNeighbors> for Neighbors {
    fn from(wire: WireNeighbors) -> Self {
        Self {
            left: wire.left.and_then(WireNeighbor::into_ref),
            right: wire.right.and_then(WireNeighbor::into_ref),
        }
    }
}

/// Both sides. Each is replaced wholesale by snapshots and deltas; narrower
/// events patch individual fields in place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireNeighbors")]
pub struct Neighbors {
    pub left: Option<NeighborRef>,
    pub right: Option<NeighborRef>,
}

impl Neighbors {
    pub fn get(&self, side: Side) -> Option<&NeighborRef> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, side: Side) -> &mut Option<NeighborRef> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Every occupied side whose occupant is `user_id`.
    ///
    /// Usually zero or one, but a corridor of two wrapping around would put
    /// the same user on both sides, so callers must not stop at the first.
    pub fn matching_mut(&mut self, user_id: UserId) -> impl Iterator<Item = &mut NeighborRef> {
        [self.left.as_mut(), self.right.as_mut()]
            .into_iter()
            .flatten()
            .filter(move |n| n.user_id == user_id)
    }

    /// Which side `user_id` occupies, if any.
    pub fn side_of(&self, user_id: UserId) -> Option<Side> {
        Side::BOTH
            .into_iter()
            .find(|side| self.get(*side).is_some_and(|n| n.user_id == user_id))
    }
}

/// Pending friend requests, keyed by the other party.
///
/// The two sets are independent: crossed requests can leave the same id in
/// both. Insertion is idempotent and order is arrival order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestLedger {
    /// Requests I sent, awaiting their decision.
    pub outgoing: IndexSet<UserId>,
    /// Requests sent to me, awaiting my decision.
    pub incoming: IndexSet<UserId>,
}

impl RequestLedger {
    pub fn from_lists(outgoing: &[UserId], incoming: &[UserId]) -> Self {
        Self {
            outgoing: outgoing.iter().copied().collect(),
            incoming: incoming.iter().copied().collect(),
        }
    }

    pub fn has_outgoing(&self, user_id: UserId) -> bool {
        self.outgoing.contains(&user_id)
    }

    pub fn has_incoming(&self, user_id: UserId) -> bool {
        self.incoming.contains(&user_id)
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.incoming.is_empty()
    }
}

/// What the client knows about its own user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelfState {
    pub id: Option<UserId>,
    pub name: Option<String>,
    /// My note as the server last reported it over HTTP.
    pub text: String,
    pub locked: bool,
}

/// Where I stand in the corridor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CorridorPosition {
    /// `None` until the first snapshot.
    pub my_index: Option<u32>,
    /// Count of occupied slots.
    pub corridor_size: u32,
}

impl CorridorPosition {
    /// Whether the index leaves room on `side` (necessary, not sufficient:
    /// the slot must also be occupied).
    pub fn has_room(&self, side: Side) -> bool {
        let Some(index) = self.my_index else {
            return false;
        };
        match side {
            Side::Left => index > 0,
            Side::Right => index.saturating_add(1) < self.corridor_size,
        }
    }
}

/// The whole client-side view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PresenceState {
    pub me: SelfState,
    pub position: CorridorPosition,
    pub neighbors: Neighbors,
    pub requests: RequestLedger,
    /// Bumped once per snapshot received over HTTP. Gates hydration of the
    /// locally editable text.
    pub text_version: u64,
}

impl PresenceState {
    pub fn neighbor(&self, side: Side) -> Option<&NeighborRef> {
        self.neighbors.get(side)
    }

    /// Whether I can step to `side`: unlocked, room in the corridor, and an
    /// occupant to swap with.
    pub fn can_move(&self, side: Side) -> bool {
        !self.me.locked && self.position.has_room(side) && self.neighbor(side).is_some()
    }

    pub fn has_outgoing(&self, side: Side) -> bool {
        self.neighbor(side)
            .is_some_and(|n| self.requests.has_outgoing(n.user_id))
    }

    pub fn has_incoming(&self, side: Side) -> bool {
        self.neighbor(side)
            .is_some_and(|n| self.requests.has_incoming(n.user_id))
    }

    /// Both of us locked, not yet friends, and no request of mine pending.
    pub fn is_friendable(&self, side: Side) -> bool {
        self.neighbor(side).is_some_and(|n| {
            self.me.locked && n.locked && !n.friend && !self.requests.has_outgoing(n.user_id)
        })
    }
}
