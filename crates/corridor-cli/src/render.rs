//! One-line rendering of the presence model.

use std::fmt::Write as _;

use corridor_types::{NeighborRef, PresenceState, Side};

pub fn render(state: &PresenceState) -> String {
    let Some(index) = state.position.my_index else {
        return "(waiting for snapshot)".to_string();
    };

    let mut out = format!("[{}/{}] me", index + 1, state.position.corridor_size);
    if let Some(name) = &state.me.name {
        let _ = write!(out, " {name}");
    } else if let Some(id) = state.me.id {
        let _ = write!(out, " #{id}");
    }
    if state.me.locked {
        out.push_str(" locked");
    }
    if !state.me.text.is_empty() {
        let _ = write!(out, " {:?}", state.me.text);
    }

    for side in Side::BOTH {
        let _ = write!(out, " | {side}: ");
        match state.neighbor(side) {
            Some(n) => render_neighbor(&mut out, state, side, n),
            None => out.push_str("empty"),
        }
    }
    out
}

fn render_neighbor(out: &mut String, state: &PresenceState, side: Side, n: &NeighborRef) {
    let _ = write!(out, "#{}", n.user_id);
    if n.locked {
        out.push_str(" locked");
    }
    if n.friend {
        out.push_str(" friend");
    }
    if let Some(text) = n.text.as_deref().filter(|t| !t.is_empty()) {
        let _ = write!(out, " {text:?}");
    }
    if state.has_incoming(side) {
        out.push_str(" (asks to be friends)");
    }
    if state.has_outgoing(side) {
        out.push_str(" (request sent)");
    } else if state.is_friendable(side) {
        out.push_str(" (can befriend)");
    }
}

#[cfg(test)]
mod tests {
    use corridor_types::{CorridorPosition, Neighbors, UserId};

    use super::*;

    #[test]
    fn test_before_snapshot() {
        assert_eq!(render(&PresenceState::default()), "(waiting for snapshot)");
    }

    #[test]
    fn test_full_line() {
        let mut state = PresenceState {
            position: CorridorPosition {
                my_index: Some(1),
                corridor_size: 3,
            },
            neighbors: Neighbors {
                left: Some(NeighborRef {
                    locked: true,
                    text: Some("west".into()),
                    ..NeighborRef::new(UserId::new(7))
                }),
                right: None,
            },
            ..Default::default()
        };
        state.me.id = Some(UserId::new(1));
        state.me.locked = true;
        state.requests.incoming.insert(UserId::new(7));

        let expected = concat!(
            "[2/3] me #1 locked | left: #7 locked \"west\" ",
            "(asks to be friends) (can befriend) | right: empty"
        );
        assert_eq!(render(&state), expected);
    }
}
