//! Full-state snapshot shapes.
//!
//! The backend speaks two snapshot dialects:
//!
//! - **Schema A** ([`Snapshot`]): a `data` envelope already in canonical shape:
//!   `myIndex`, `corridorSize`, `neighbors`, `locked`, `requests`.
//! - **Schema B** ([`CorridorSnapshot`]): flat `me` / `left` / `right` /
//!   `corridor.size`, with request flags carried on each neighbor.
//!
//! Conversion from B to A lives in the client's normalizer, not here; these
//! are plain data.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::presence::Neighbors;

/// Wire tag for schema-A snapshots pushed over the event channel.
pub const SNAPSHOT_TAG: &str = "SNAPSHOT";

// ============================================================================
// Schema A
// ============================================================================

/// Canonical snapshot envelope: `{ "type": "SNAPSHOT", "data": { … } }`.
///
/// The `type` key is optional on input (the HTTP endpoint omits it) and
/// always written on output.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Snapshot {
    pub data: SnapshotData,
}

impl Serialize for Snapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Snapshot", 2)?;
        s.serialize_field("type", SNAPSHOT_TAG)?;
        s.serialize_field("data", &self.data)?;
        s.end()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<SnapshotMe>,
    pub my_index: u32,
    pub corridor_size: u32,
    #[serde(default)]
    pub neighbors: Neighbors,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub requests: RequestPayload,
}

/// Self block of a schema-A snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    /// Outer `None` = key absent (keep the current name); `Some(None)` = the
    /// server cleared it.
    #[serde(
        default,
        deserialize_with = "crate::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub username: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Request ledger as lists of user ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    #[serde(default)]
    pub outgoing: Vec<UserId>,
    #[serde(default)]
    pub incoming: Vec<UserId>,
}

// ============================================================================
// Schema B
// ============================================================================

/// Flat legacy snapshot. Self-describing by shape; carries no `type` tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorridorSnapshot {
    pub me: CorridorMe,
    #[serde(default)]
    pub left: Option<CorridorNeighbor>,
    #[serde(default)]
    pub right: Option<CorridorNeighbor>,
    pub corridor: CorridorInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorridorMe {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub locked: bool,
    pub my_index: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorridorNeighbor {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub friend: bool,
    #[serde(default)]
    pub request_to_me: bool,
    #[serde(default)]
    pub request_from_me: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorridorInfo {
    pub size: u32,
}
