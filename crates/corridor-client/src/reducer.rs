//! Presence reducer: the deterministic fold of events onto the model.
//!
//! Every inbound payload, whichever transport it came from, becomes one
//! [`PresenceEvent`] and goes through [`reduce`]. There is no other way to
//! change a [`PresenceState`].
//!
//! # Transition rules
//!
//! ```text
//! Snapshot (http|push) ─▶ replace me/position/neighbors/ledger wholesale
//!                          http only: overwrite my text, bump text_version
//! NeighborsUpdated     ─▶ replace position + each side the delta mentions
//! LockChanged          ─▶ me (if it's me) AND every matching neighbor
//! FriendshipCreated    ─▶ friend flag on matching neighbors (+ lock if auto)
//! Request*             ─▶ ledger only (Accepted also sets friend flag)
//! NeighborText         ─▶ text of the matching neighbor only
//! ```
//!
//! Narrow events patch one field of an existing reference and never create
//! one: an event naming someone who isn't my neighbor changes nothing.
//! Applied in sequence, later events win per field, not per record.
//!
//! Transitions are total. Nothing here can fail; malformed input never gets
//! this far.

use corridor_types::{
    CorridorPosition, NeighborsUpdated, PresenceState, RequestLedger, Snapshot, UserId, UserPair,
};
use tracing::trace;

/// Which transport delivered a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// Explicit fetch. The only origin allowed to rehydrate my editable text.
    Http,
    /// Pushed over the event channel, possibly an echo of my own prior state.
    Push,
}

/// A normalized, classified event ready to fold onto the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PresenceEvent {
    Snapshot {
        snapshot: Snapshot,
        origin: SnapshotOrigin,
    },
    NeighborsUpdated(NeighborsUpdated),
    LockChanged {
        user_id: UserId,
        locked: bool,
    },
    FriendshipCreated {
        pair: UserPair,
        auto_lock: bool,
    },
    RequestIncoming(UserId),
    RequestCancelled(UserId),
    RequestAccepted(UserId),
    RequestRejected(UserId),
    NeighborText {
        user_id: UserId,
        text: String,
    },
    /// Who I am, as resolved by the session (not part of any snapshot).
    Identify {
        id: Option<UserId>,
        name: Option<String>,
    },
    /// Back to the initial model. The text version survives so drafts keep
    /// rehydrating from later HTTP snapshots.
    Reset,
}

impl PresenceEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PresenceEvent::Snapshot { origin: SnapshotOrigin::Http, .. } => "snapshot(http)",
            PresenceEvent::Snapshot { origin: SnapshotOrigin::Push, .. } => "snapshot(push)",
            PresenceEvent::NeighborsUpdated(_) => "neighbors_updated",
            PresenceEvent::LockChanged { .. } => "lock_changed",
            PresenceEvent::FriendshipCreated { auto_lock: false, .. } => "friendship_created",
            PresenceEvent::FriendshipCreated { auto_lock: true, .. } => "auto_lock",
            PresenceEvent::RequestIncoming(_) => "request_incoming",
            PresenceEvent::RequestCancelled(_) => "request_cancelled",
            PresenceEvent::RequestAccepted(_) => "request_accepted",
            PresenceEvent::RequestRejected(_) => "request_rejected",
            PresenceEvent::NeighborText { .. } => "neighbor_text",
            PresenceEvent::Identify { .. } => "identify",
            PresenceEvent::Reset => "reset",
        }
    }
}

/// Fold one event onto a model, returning the next model.
pub fn reduce(state: &PresenceState, event: &PresenceEvent) -> PresenceState {
    let mut next = state.clone();
    apply(&mut next, event);
    next
}

/// In-place form of [`reduce`], for owners that hold the only copy.
pub fn apply(state: &mut PresenceState, event: &PresenceEvent) {
    trace!(kind = event.kind(), "applying presence event");
    match event {
        PresenceEvent::Snapshot { snapshot, origin } => apply_snapshot(state, snapshot, *origin),
        PresenceEvent::NeighborsUpdated(update) => apply_neighbors_updated(state, update),
        PresenceEvent::LockChanged { user_id, locked } => apply_lock(state, *user_id, *locked),
        PresenceEvent::FriendshipCreated { pair, auto_lock } => {
            apply_friendship(state, pair, *auto_lock)
        }
        PresenceEvent::RequestIncoming(from) => {
            state.requests.incoming.insert(*from);
        }
        PresenceEvent::RequestCancelled(from) => {
            state.requests.incoming.shift_remove(from);
        }
        PresenceEvent::RequestAccepted(by) => apply_request_accepted(state, *by),
        PresenceEvent::RequestRejected(by) => {
            state.requests.outgoing.shift_remove(by);
        }
        PresenceEvent::NeighborText { user_id, text } => apply_neighbor_text(state, *user_id, text),
        PresenceEvent::Identify { id, name } => {
            state.me.id = *id;
            state.me.name = name.clone();
        }
        PresenceEvent::Reset => {
            *state = PresenceState {
                text_version: state.text_version,
                ..Default::default()
            }
        }
    }
}

/// Replace everything the snapshot describes.
///
/// The ledger is the snapshot's lists plus the per-neighbor request flags,
/// without duplicates. Only an HTTP snapshot touches my text and the text
/// version.
pub fn apply_snapshot(state: &mut PresenceState, snapshot: &Snapshot, origin: SnapshotOrigin) {
    let data = &snapshot.data;

    let mut requests =
        RequestLedger::from_lists(&data.requests.outgoing, &data.requests.incoming);
    for neighbor in [&data.neighbors.left, &data.neighbors.right].into_iter().flatten() {
        if neighbor.request_from_me {
            requests.outgoing.insert(neighbor.user_id);
        }
        if neighbor.request_to_me {
            requests.incoming.insert(neighbor.user_id);
        }
    }

    if let Some(me) = &data.me {
        if let Some(id) = me.id {
            state.me.id = Some(id);
        }
        if let Some(name) = &me.username {
            state.me.name = name.clone();
        }
    }

    state.position = CorridorPosition {
        my_index: Some(data.my_index),
        corridor_size: data.corridor_size,
    };
    state.neighbors = data.neighbors.clone();
    state.me.locked = data.locked;
    state.requests = requests;

    if origin == SnapshotOrigin::Http {
        if let Some(text) = data.me.as_ref().and_then(|me| me.text.as_ref()) {
            state.me.text = text.clone();
        }
        state.text_version = state.text_version.wrapping_add(1);
    }
}

/// Position always; each side only if the delta mentions it.
pub fn apply_neighbors_updated(state: &mut PresenceState, update: &NeighborsUpdated) {
    state.position = CorridorPosition {
        my_index: Some(update.my_index),
        corridor_size: update.corridor_size,
    };
    if let Some(left) = &update.left {
        state.neighbors.left = left.clone();
    }
    if let Some(right) = &update.right {
        state.neighbors.right = right.clone();
    }
}

/// Self and neighbor checks are independent and both always run.
pub fn apply_lock(state: &mut PresenceState, user_id: UserId, locked: bool) {
    if state.me.id == Some(user_id) {
        state.me.locked = locked;
    }
    for neighbor in state.neighbors.matching_mut(user_id) {
        neighbor.locked = locked;
    }
}

/// Marks matching neighbors as friends. The ledger is left alone; the
/// lifecycle events clean it up.
///
/// An auto-lock locks both members of the pair, which includes me when I'm
/// one of them.
pub fn apply_friendship(state: &mut PresenceState, pair: &UserPair, auto_lock: bool) {
    for user_id in pair.ids() {
        for neighbor in state.neighbors.matching_mut(user_id) {
            neighbor.friend = true;
        }
        if auto_lock {
            apply_lock(state, user_id, true);
        }
    }
}

pub fn apply_request_accepted(state: &mut PresenceState, by: UserId) {
    state.requests.outgoing.shift_remove(&by);
    for neighbor in state.neighbors.matching_mut(by) {
        neighbor.friend = true;
    }
}

pub fn apply_neighbor_text(state: &mut PresenceState, user_id: UserId, text: &str) {
    for neighbor in state.neighbors.matching_mut(user_id) {
        neighbor.text = Some(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use corridor_types::{NeighborRef, Neighbors, RequestPayload, SnapshotData, SnapshotMe};

    use super::*;

    fn id(raw: i64) -> UserId {
        UserId::new(raw)
    }

    fn neighbor(raw: i64) -> NeighborRef {
        NeighborRef::new(id(raw))
    }

    fn snapshot(
        me: Option<SnapshotMe>,
        left: Option<NeighborRef>,
        right: Option<NeighborRef>,
    ) -> Snapshot {
        Snapshot {
            data: SnapshotData {
                me,
                my_index: 2,
                corridor_size: 5,
                neighbors: Neighbors { left, right },
                locked: false,
                requests: RequestPayload::default(),
            },
        }
    }

    fn me(raw: i64, text: Option<&str>) -> SnapshotMe {
        SnapshotMe {
            id: Some(id(raw)),
            username: None,
            text: text.map(String::from),
        }
    }

    fn from_http(snapshot: Snapshot) -> PresenceEvent {
        PresenceEvent::Snapshot {
            snapshot,
            origin: SnapshotOrigin::Http,
        }
    }

    fn from_push(snapshot: Snapshot) -> PresenceEvent {
        PresenceEvent::Snapshot {
            snapshot,
            origin: SnapshotOrigin::Push,
        }
    }

    fn lock(raw: i64, locked: bool) -> PresenceEvent {
        PresenceEvent::LockChanged {
            user_id: id(raw),
            locked,
        }
    }

    fn neighbor_text(raw: i64, text: &str) -> PresenceEvent {
        PresenceEvent::NeighborText {
            user_id: id(raw),
            text: text.into(),
        }
    }

    /// Me = 1 at index 2 of 5, left = 7, right = 8.
    fn seeded() -> PresenceState {
        let mut left = neighbor(7);
        left.text = Some("left note".into());
        let right = neighbor(8);
        let snap = snapshot(Some(me(1, Some("mine"))), Some(left), Some(right));
        reduce(&PresenceState::default(), &from_http(snap))
    }

    #[test]
    fn test_http_snapshot_hydrates_text() {
        let state = seeded();
        assert_eq!(state.me.id, Some(id(1)));
        assert_eq!(state.me.text, "mine");
        assert_eq!(state.text_version, 1);
        assert_eq!(state.position.my_index, Some(2));
        assert_eq!(state.position.corridor_size, 5);
    }

    #[test]
    fn test_http_snapshot_without_text_keeps_text_but_bumps_version() {
        let state = seeded();
        let next = reduce(&state, &from_http(snapshot(Some(me(1, None)), None, None)));
        assert_eq!(next.me.text, "mine");
        assert_eq!(next.text_version, 2);
    }

    #[test]
    fn test_push_snapshot_never_touches_text() {
        let mut state = seeded();
        state.me.text = "draft".into();

        let mut right = neighbor(9);
        right.locked = true;
        let mut snap = snapshot(Some(me(1, Some("stale echo"))), None, Some(right));
        snap.data.locked = true;
        snap.data.requests.incoming = vec![id(9)];

        let next = reduce(&state, &from_push(snap));

        assert_eq!(next.me.text, "draft");
        assert_eq!(next.text_version, state.text_version);
        assert!(next.me.locked);
        assert!(next.neighbors.left.is_none());
        assert_eq!(next.neighbors.right.as_ref().map(|n| n.user_id), Some(id(9)));
        assert!(next.requests.has_incoming(id(9)));
    }

    #[test]
    fn test_snapshot_folds_neighbor_flags_without_duplicates() {
        let mut left = neighbor(7);
        left.request_from_me = true;
        let mut right = neighbor(8);
        right.request_to_me = true;
        let mut snap = snapshot(None, Some(left), Some(right));
        snap.data.requests.outgoing = vec![id(7), id(3)];

        let state = reduce(&PresenceState::default(), &from_push(snap));

        assert_eq!(state.requests.outgoing.iter().copied().collect::<Vec<_>>(), vec![id(7), id(3)]);
        assert_eq!(state.requests.incoming.iter().copied().collect::<Vec<_>>(), vec![id(8)]);
    }

    #[test]
    fn test_snapshot_replaces_ledger_wholesale() {
        let mut state = seeded();
        state.requests.outgoing.insert(id(42));
        let next = reduce(&state, &from_push(snapshot(None, None, None)));
        assert!(next.requests.is_empty());
    }

    #[test]
    fn test_snapshot_identity_and_name_rules() {
        let mut state = PresenceState::default();
        state.me.id = Some(id(1));
        state.me.name = Some("ada".into());

        // no `me` block: id and name kept
        let next = reduce(&state, &from_http(snapshot(None, None, None)));
        assert_eq!(next.me.id, Some(id(1)));
        assert_eq!(next.me.name.as_deref(), Some("ada"));

        // explicit null username clears
        let cleared = SnapshotMe {
            id: None,
            username: Some(None),
            text: None,
        };
        let next = reduce(&state, &from_http(snapshot(Some(cleared), None, None)));
        assert_eq!(next.me.id, Some(id(1)));
        assert_eq!(next.me.name, None);
    }

    #[test]
    fn test_neighbors_update_partial_sides() {
        let snap = snapshot(None, Some(neighbor(7)), None);
        let state = reduce(&PresenceState::default(), &from_http(snap));

        let delta = NeighborsUpdated {
            my_index: 1,
            corridor_size: 4,
            left: Some(None),
            right: None,
        };
        let next = reduce(&state, &PresenceEvent::NeighborsUpdated(delta));

        assert!(next.neighbors.left.is_none());
        assert!(next.neighbors.right.is_none());
        assert_eq!(next.position.my_index, Some(1));
        assert_eq!(next.position.corridor_size, 4);
    }

    #[test]
    fn test_neighbors_update_omitted_side_keeps_reference() {
        let state = seeded();
        let delta = NeighborsUpdated {
            my_index: 3,
            corridor_size: 5,
            left: Some(Some(neighbor(11))),
            right: None,
        };
        let next = reduce(&state, &PresenceEvent::NeighborsUpdated(delta));
        assert_eq!(next.neighbors.left.as_ref().map(|n| n.user_id), Some(id(11)));
        assert_eq!(next.neighbors.right, state.neighbors.right);
    }

    #[test]
    fn test_lock_applies_to_self_and_neighbors_independently() {
        let state = seeded();
        let next = reduce(&state, &lock(1, true));
        assert!(next.me.locked);
        assert!(!next.neighbors.left.as_ref().unwrap().locked);

        let next = reduce(&next, &lock(8, true));
        assert!(next.neighbors.right.as_ref().unwrap().locked);
        assert!(next.me.locked);

        let next = reduce(&next, &lock(1, false));
        assert!(!next.me.locked);
        assert!(next.neighbors.right.as_ref().unwrap().locked);
    }

    #[test]
    fn test_lock_for_stranger_is_noop() {
        let state = seeded();
        let next = reduce(&state, &lock(99, true));
        assert_eq!(next, state);
    }

    #[test]
    fn test_lock_without_known_self_id_is_noop_for_self() {
        let mut state = seeded();
        state.me.id = None;
        let next = reduce(&state, &lock(1, true));
        assert!(!next.me.locked);
    }

    #[test]
    fn test_friendship_sets_friend_not_ledger() {
        let mut state = seeded();
        state.requests.outgoing.insert(id(7));
        let pair = UserPair {
            user_id1: id(1),
            user_id2: id(7),
        };

        let event = PresenceEvent::FriendshipCreated {
            pair,
            auto_lock: false,
        };
        let next = reduce(&state, &event);
        let left = next.neighbors.left.as_ref().unwrap();
        assert!(left.friend);
        assert!(!left.locked);
        assert!(!next.neighbors.right.as_ref().unwrap().friend);
        // stale ledger entry survives the broadcast
        assert!(next.requests.has_outgoing(id(7)));
        assert!(!next.me.locked);
    }

    #[test]
    fn test_auto_lock_locks_pair() {
        let state = seeded();
        let pair = UserPair {
            user_id1: id(8),
            user_id2: id(1),
        };
        let event = PresenceEvent::FriendshipCreated {
            pair,
            auto_lock: true,
        };
        let next = reduce(&state, &event);
        let right = next.neighbors.right.as_ref().unwrap();
        assert!(right.friend);
        assert!(right.locked);
        assert!(next.me.locked);
        assert!(!next.neighbors.left.as_ref().unwrap().locked);
    }

    #[test]
    fn test_request_incoming_is_idempotent() {
        let state = PresenceState::default();
        let once = reduce(&state, &PresenceEvent::RequestIncoming(id(9)));
        let twice = reduce(&once, &PresenceEvent::RequestIncoming(id(9)));
        assert_eq!(twice.requests.incoming.iter().copied().collect::<Vec<_>>(), vec![id(9)]);
        assert!(twice.requests.outgoing.is_empty());
    }

    #[test]
    fn test_request_cancelled_removes_incoming_only() {
        let mut state = PresenceState::default();
        state.requests.incoming.insert(id(4));
        state.requests.outgoing.insert(id(4));
        let next = reduce(&state, &PresenceEvent::RequestCancelled(id(4)));
        assert!(!next.requests.has_incoming(id(4)));
        assert!(next.requests.has_outgoing(id(4)));
    }

    #[test]
    fn test_request_accepted_twice_removes_once() {
        let mut state = seeded();
        state.requests.outgoing.insert(id(7));
        state.requests.outgoing.insert(id(3));

        let once = reduce(&state, &PresenceEvent::RequestAccepted(id(7)));
        let twice = reduce(&once, &PresenceEvent::RequestAccepted(id(7)));

        assert_eq!(once, twice);
        assert!(!twice.requests.has_outgoing(id(7)));
        assert!(twice.requests.has_outgoing(id(3)));
        assert!(twice.neighbors.left.as_ref().unwrap().friend);
    }

    #[test]
    fn test_request_rejected_keeps_friend_flag() {
        let mut state = seeded();
        state.requests.outgoing.insert(id(8));
        let next = reduce(&state, &PresenceEvent::RequestRejected(id(8)));
        assert!(!next.requests.has_outgoing(id(8)));
        assert!(!next.neighbors.right.as_ref().unwrap().friend);
    }

    #[test]
    fn test_neighbor_text_last_write_wins_per_field() {
        let mut state = seeded();
        {
            let left = state.neighbors.left.as_mut().unwrap();
            left.locked = true;
            left.friend = true;
        }
        let before = state.neighbors.left.clone().unwrap();

        let mut next = state.clone();
        for text in ["a", "ab", "abc", ""] {
            next = reduce(&next, &neighbor_text(7, text));
        }

        let after = next.neighbors.left.clone().unwrap();
        assert_eq!(after.text.as_deref(), Some(""));
        let restored = NeighborRef {
            text: before.text.clone(),
            ..after
        };
        assert_eq!(restored, before);
        assert_eq!(next.neighbors.right, state.neighbors.right);
        assert_eq!(next.me, state.me);
    }

    #[test]
    fn test_neighbor_text_for_stranger_is_noop() {
        let state = seeded();
        let next = reduce(&state, &neighbor_text(50, "x"));
        assert_eq!(next, state);
    }

    #[test]
    fn test_identify_and_reset() {
        let state = reduce(
            &PresenceState::default(),
            &PresenceEvent::Identify {
                id: Some(id(3)),
                name: Some("ada".into()),
            },
        );
        assert_eq!(state.me.id, Some(id(3)));
        assert_eq!(state.me.name.as_deref(), Some("ada"));

        let state = reduce(&seeded(), &PresenceEvent::Reset);
        assert_eq!(
            state,
            PresenceState {
                text_version: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_reset_keeps_text_version_increasing() {
        let state = reduce(&seeded(), &PresenceEvent::Reset);
        let snap = snapshot(Some(me(1, Some("fresh"))), None, None);
        let next = reduce(&state, &from_http(snap));
        assert_eq!(next.text_version, 2);
        assert_eq!(next.me.text, "fresh");
    }

    #[test]
    fn test_reduce_leaves_input_untouched() {
        let state = seeded();
        let copy = state.clone();
        let _ = reduce(&state, &PresenceEvent::Reset);
        assert_eq!(state, copy);
    }
}
