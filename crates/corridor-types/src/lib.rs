//! Shared presence types for corridor.
//!
//! This crate is the leaf of the workspace: typed ids, the canonical presence
//! model every client component reads and writes, and the serde shapes of
//! everything the backend sends. It has **no internal corridor dependencies**.
//!
//! # Overview
//!
//! ```text
//! Corridor (ordered occupied slots)
//!     └── me (UserId, index, lock, text)
//!     └── left neighbor  ← slot index - 1, if occupied
//!     └── right neighbor ← slot index + 1, if occupied
//!     └── request ledger (outgoing / incoming friend requests)
//! ```
//!
//! # Key Types
//!
//! |----------------------|-----------------------------------------------|
//! | Type                 | Purpose                                       |
//! |----------------------|-----------------------------------------------|
//! | [`UserId`]           | Opaque user identity                          |
//! | [`Side`]             | Left or right of me                           |
//! | [`PresenceState`]    | Canonical model (me + neighbors + ledger)     |
//! | [`NeighborRef`]      | One occupied side                             |
//! | [`Snapshot`]         | Canonical full snapshot (schema A)            |
//! | [`CorridorSnapshot`] | Flat legacy snapshot (schema B)               |
//! | [`DirectEvent`]      | Events addressed to this user                 |
//! | [`Broadcast`]        | Fan-out events about one or two users         |
//! |----------------------|-----------------------------------------------|

pub mod event;
pub mod ids;
pub mod presence;
pub mod snapshot;

pub use event::{
    Broadcast, DirectEvent, MoveResult, NeighborTextUpdated, NeighborsUpdated, RequestBy,
    RequestFrom, UserJoined, UserLeft, UserPair, UserRef,
};
pub use ids::UserId;
pub use presence::{
    CorridorPosition, NeighborRef, Neighbors, PresenceState, RequestLedger, SelfState, Side,
};
pub use snapshot::{
    CorridorInfo, CorridorMe, CorridorNeighbor, CorridorSnapshot, RequestPayload, Snapshot,
    SnapshotData, SnapshotMe,
};

/// Deserialize a field that distinguishes "absent" from "explicit null".
///
/// Use with `#[serde(default, deserialize_with = "crate::double_option")]` on an
/// `Option<Option<T>>` field: missing → `None`, `null` → `Some(None)`,
/// value → `Some(Some(v))`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}
