//! Snapshot normalization.
//!
//! Both snapshot dialects end up as one canonical [`Snapshot`] before the
//! reducer sees them, so the reducer never branches on schema.
//!
//! - Schema A (`{ data: { … } }`) is already canonical and only decoded.
//! - Schema B (`{ me, left, right, corridor }`) is detected structurally and
//!   converted: per-neighbor request flags are redistributed into the
//!   top-level ledger lists.

use corridor_types::{
    CorridorNeighbor, CorridorSnapshot, NeighborRef, Neighbors, RequestPayload, Snapshot,
    SnapshotData, SnapshotMe,
};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// Neither the schema-A envelope nor the schema-B shape matched.
    #[error("snapshot format not recognized")]
    Unrecognized,
    /// Had a `data` envelope, but its contents didn't decode.
    #[error("invalid snapshot envelope: {0}")]
    InvalidEnvelope(String),
    /// Passed the schema-B shape test, but a field didn't decode.
    #[error("invalid corridor snapshot: {0}")]
    InvalidCorridor(String),
}

/// Structural test for schema B: `me` object with numeric `id` and `myIndex`,
/// and a `corridor` object with numeric `size`.
pub fn is_corridor_snapshot(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let (Some(me), Some(corridor)) = (
        obj.get("me").and_then(Value::as_object),
        obj.get("corridor").and_then(Value::as_object),
    ) else {
        return false;
    };
    me.get("id").is_some_and(Value::is_number)
        && me.get("myIndex").is_some_and(Value::is_number)
        && corridor.get("size").is_some_and(Value::is_number)
}

/// Whether `value` carries the schema-A `data` envelope key.
pub fn has_snapshot_envelope(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| obj.contains_key("data"))
}

fn to_neighbor_ref(neighbor: &CorridorNeighbor) -> NeighborRef {
    NeighborRef {
        user_id: neighbor.id,
        locked: neighbor.locked,
        friend: neighbor.friend,
        text: neighbor.text.clone(),
        request_to_me: neighbor.request_to_me,
        request_from_me: neighbor.request_from_me,
    }
}

/// Convert a schema-B snapshot to the canonical shape. Pure and total.
pub fn convert_corridor_snapshot(snapshot: &CorridorSnapshot) -> Snapshot {
    let mut requests = RequestPayload::default();
    for neighbor in [&snapshot.left, &snapshot.right].into_iter().flatten() {
        if neighbor.request_from_me {
            requests.outgoing.push(neighbor.id);
        }
        if neighbor.request_to_me {
            requests.incoming.push(neighbor.id);
        }
    }

    Snapshot {
        data: SnapshotData {
            me: Some(SnapshotMe {
                id: Some(snapshot.me.id),
                username: None,
                text: snapshot.me.text.clone(),
            }),
            my_index: snapshot.me.my_index,
            corridor_size: snapshot.corridor.size,
            neighbors: Neighbors {
                left: snapshot.left.as_ref().map(to_neighbor_ref),
                right: snapshot.right.as_ref().map(to_neighbor_ref),
            },
            locked: snapshot.me.locked,
            requests,
        },
    }
}

/// Decode a schema-B payload that already passed [`is_corridor_snapshot`].
pub fn decode_corridor_snapshot(value: &Value) -> Result<Snapshot, NormalizeError> {
    let corridor: CorridorSnapshot = serde_json::from_value(value.clone())
        .map_err(|e| NormalizeError::InvalidCorridor(e.to_string()))?;
    Ok(convert_corridor_snapshot(&corridor))
}

/// Normalize a snapshot fetched over HTTP.
///
/// The `data` envelope is checked first; a payload with neither the envelope
/// nor the schema-B shape is [`NormalizeError::Unrecognized`].
pub fn normalize_snapshot(value: &Value) -> Result<Snapshot, NormalizeError> {
    if has_snapshot_envelope(value) {
        return serde_json::from_value(value.clone())
            .map_err(|e| NormalizeError::InvalidEnvelope(e.to_string()));
    }
    if is_corridor_snapshot(value) {
        return decode_corridor_snapshot(value);
    }
    Err(NormalizeError::Unrecognized)
}
