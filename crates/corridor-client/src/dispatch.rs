//! Command dispatcher: user intents in, outbound requests out.
//!
//! Nothing here writes to the model. Preconditions are checked against the
//! current model before any request is issued; a failed precondition sends
//! nothing and says which check failed. Every visible change arrives later
//! as a push event or snapshot through the session timeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use corridor_types::{MoveResult, PresenceState, Side};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::transport::{Action, PresenceTransport, TransportError, parse_move_result};

/// Why an intent was not sent.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    #[error("already locked")]
    Locked,
    #[error("not locked")]
    Unlocked,
    #[error("no room to the {0}")]
    NoRoom(Side),
    #[error("nobody on the {0}")]
    NoNeighbor(Side),
    #[error("a move is already in flight")]
    MoveInFlight,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Server accepted the move. The model still waits for the follow-up
    /// event.
    Moved(MoveResult),
    /// 409: the move is currently invalid. Retry after the next update.
    Conflict,
    Skipped(Precondition),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Sent,
    Skipped(Precondition),
}

#[derive(Clone)]
pub struct CommandDispatcher {
    transport: Arc<dyn PresenceTransport>,
    state: watch::Receiver<PresenceState>,
    moving: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the move finishes, however it finishes.
struct MoveGuard<'a>(&'a AtomicBool);

impl Drop for MoveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CommandDispatcher {
    pub fn new(
        transport: Arc<dyn PresenceTransport>,
        state: watch::Receiver<PresenceState>,
    ) -> Self {
        Self {
            transport,
            state,
            moving: Arc::new(AtomicBool::new(false)),
        }
    }

    fn check(
        &self,
        check: impl FnOnce(&PresenceState) -> Option<Precondition>,
    ) -> Option<Precondition> {
        check(&*self.state.borrow())
    }

    pub async fn move_left(&self) -> Result<MoveOutcome, TransportError> {
        self.move_toward(Side::Left).await
    }

    pub async fn move_right(&self) -> Result<MoveOutcome, TransportError> {
        self.move_toward(Side::Right).await
    }

    /// Step one slot toward `side`. At most one move is in flight at a time.
    pub async fn move_toward(&self, side: Side) -> Result<MoveOutcome, TransportError> {
        if let Some(failed) = self.check(|s| move_precondition(s, side)) {
            debug!(%side, %failed, "move skipped");
            return Ok(MoveOutcome::Skipped(failed));
        }
        if self.moving.swap(true, Ordering::AcqRel) {
            debug!(%side, "move skipped, another in flight");
            return Ok(MoveOutcome::Skipped(Precondition::MoveInFlight));
        }
        let _guard = MoveGuard(&self.moving);

        match self.transport.post_action(Action::move_toward(side)).await {
            Ok(body) => parse_move_result(body).map(MoveOutcome::Moved),
            Err(TransportError::Conflict) => {
                warn!(%side, "move rejected with conflict");
                Ok(MoveOutcome::Conflict)
            }
            Err(e) => {
                warn!(%side, error = %e, "move failed");
                Err(e)
            }
        }
    }

    pub async fn lock(&self) -> Result<CommandOutcome, TransportError> {
        let failed = self.check(|s| s.me.locked.then_some(Precondition::Locked));
        self.send(Action::Lock, failed).await
    }

    pub async fn unlock(&self) -> Result<CommandOutcome, TransportError> {
        let failed = self.check(|s| (!s.me.locked).then_some(Precondition::Unlocked));
        self.send(Action::Unlock, failed).await
    }

    pub async fn leave(&self) -> Result<CommandOutcome, TransportError> {
        self.send(Action::Leave, None).await
    }

    pub async fn send_request(&self, side: Side) -> Result<CommandOutcome, TransportError> {
        self.request(Action::SendRequest(side), side).await
    }

    pub async fn cancel_request(&self, side: Side) -> Result<CommandOutcome, TransportError> {
        self.request(Action::CancelRequest(side), side).await
    }

    pub async fn accept_request(&self, side: Side) -> Result<CommandOutcome, TransportError> {
        self.request(Action::AcceptRequest(side), side).await
    }

    pub async fn reject_request(&self, side: Side) -> Result<CommandOutcome, TransportError> {
        self.request(Action::RejectRequest(side), side).await
    }

    /// Publish my text. Fire-and-forget; no confirmation is awaited.
    pub fn update_text(&self, text: &str) -> Result<(), TransportError> {
        self.transport.publish_text(text).inspect_err(|e| {
            debug!(error = %e, "text update not sent");
        })
    }

    async fn request(&self, action: Action, side: Side) -> Result<CommandOutcome, TransportError> {
        let failed = self.check(|s| {
            s.neighbor(side)
                .is_none()
                .then_some(Precondition::NoNeighbor(side))
        });
        self.send(action, failed).await
    }

    async fn send(
        &self,
        action: Action,
        failed: Option<Precondition>,
    ) -> Result<CommandOutcome, TransportError> {
        if let Some(failed) = failed {
            debug!(?action, %failed, "intent skipped");
            return Ok(CommandOutcome::Skipped(failed));
        }
        match self.transport.post_action(action).await {
            Ok(_) => Ok(CommandOutcome::Sent),
            Err(e) => {
                warn!(?action, error = %e, "action failed");
                Err(e)
            }
        }
    }
}

fn move_precondition(state: &PresenceState, side: Side) -> Option<Precondition> {
    if state.me.locked {
        Some(Precondition::Locked)
    } else if !state.position.has_room(side) {
        Some(Precondition::NoRoom(side))
    } else if state.neighbor(side).is_none() {
        Some(Precondition::NoNeighbor(side))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use corridor_types::{CorridorPosition, NeighborRef, Neighbors, SelfState, UserId};
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use tokio::sync::Notify;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        actions: Mutex<Vec<Action>>,
        texts: Mutex<Vec<String>>,
        reply: Mutex<Option<Result<Option<Value>, TransportError>>>,
        gate: Option<Notify>,
    }

    #[async_trait]
    impl PresenceTransport for Recorder {
        async fn fetch_snapshot(&self) -> Result<Value, TransportError> {
            Err(TransportError::NotFound)
        }

        async fn post_action(&self, action: Action) -> Result<Option<Value>, TransportError> {
            self.actions.lock().push(action);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.reply.lock().clone().unwrap_or(Ok(None))
        }

        fn publish_text(&self, text: &str) -> Result<(), TransportError> {
            self.texts.lock().push(text.to_string());
            Ok(())
        }
    }

    fn state(locked: bool) -> PresenceState {
        PresenceState {
            me: SelfState {
                id: Some(UserId::new(1)),
                locked,
                ..Default::default()
            },
            position: CorridorPosition {
                my_index: Some(1),
                corridor_size: 3,
            },
            neighbors: Neighbors {
                left: Some(NeighborRef::new(UserId::new(7))),
                right: Some(NeighborRef::new(UserId::new(8))),
            },
            ..Default::default()
        }
    }

    fn dispatcher(
        recorder: Arc<Recorder>,
        state: PresenceState,
    ) -> (CommandDispatcher, watch::Sender<PresenceState>) {
        let (tx, rx) = watch::channel(state);
        (CommandDispatcher::new(recorder, rx), tx)
    }

    #[tokio::test]
    async fn test_move_while_locked_sends_nothing() {
        let recorder = Arc::new(Recorder::default());
        let before = state(true);
        let (dispatch, tx) = dispatcher(recorder.clone(), before.clone());

        let outcome = dispatch.move_right().await.unwrap();
        assert_eq!(outcome, MoveOutcome::Skipped(Precondition::Locked));
        assert!(recorder.actions.lock().is_empty());
        assert_eq!(*tx.borrow(), before);
    }

    #[tokio::test]
    async fn test_move_preconditions() {
        let recorder = Arc::new(Recorder::default());
        let mut edge = state(false);
        edge.position.my_index = Some(0);
        edge.neighbors.right = None;
        let (dispatch, _tx) = dispatcher(recorder.clone(), edge);

        assert_eq!(
            dispatch.move_left().await.unwrap(),
            MoveOutcome::Skipped(Precondition::NoRoom(Side::Left))
        );
        assert_eq!(
            dispatch.move_right().await.unwrap(),
            MoveOutcome::Skipped(Precondition::NoNeighbor(Side::Right))
        );
        assert!(recorder.actions.lock().is_empty());
    }

    #[tokio::test]
    async fn test_move_success_and_conflict() {
        let recorder = Arc::new(Recorder::default());
        *recorder.reply.lock() = Some(Ok(Some(json!({
            "ok": true,
            "result": { "userId": 1, "fromIndex": 1, "toIndex": 2, "corridorSize": 3 }
        }))));
        let before = state(false);
        let (dispatch, tx) = dispatcher(recorder.clone(), before.clone());

        let MoveOutcome::Moved(result) = dispatch.move_right().await.unwrap() else {
            panic!("expected a move");
        };
        assert_eq!(result.to_index, 2);
        assert_eq!(*tx.borrow(), before, "a move never touches the model itself");

        *recorder.reply.lock() = Some(Err(TransportError::Conflict));
        assert_eq!(dispatch.move_left().await.unwrap(), MoveOutcome::Conflict);
        assert_eq!(*recorder.actions.lock(), vec![Action::MoveRight, Action::MoveLeft]);
        assert_eq!(*tx.borrow(), before);
    }

    #[tokio::test]
    async fn test_second_move_skipped_while_first_in_flight() {
        let recorder = Arc::new(Recorder {
            gate: Some(Notify::new()),
            ..Default::default()
        });
        let (dispatch, _tx) = dispatcher(recorder.clone(), state(false));

        let first = tokio::spawn({
            let dispatch = dispatch.clone();
            async move { dispatch.move_right().await }
        });
        while recorder.actions.lock().is_empty() {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            dispatch.move_left().await.unwrap(),
            MoveOutcome::Skipped(Precondition::MoveInFlight)
        );

        if let Some(gate) = &recorder.gate {
            gate.notify_one();
        }
        // empty body is malformed for a move, but the flag must clear either way
        assert!(matches!(first.await.unwrap(), Err(TransportError::Malformed(_))));

        if let Some(gate) = &recorder.gate {
            gate.notify_one();
        }
        assert!(!matches!(
            dispatch.move_left().await,
            Ok(MoveOutcome::Skipped(Precondition::MoveInFlight))
        ));
    }

    #[tokio::test]
    async fn test_request_actions_are_not_optimistic() {
        let recorder = Arc::new(Recorder::default());
        let before = state(true);
        let (dispatch, tx) = dispatcher(recorder.clone(), before.clone());

        assert_eq!(dispatch.send_request(Side::Left).await.unwrap(), CommandOutcome::Sent);
        assert_eq!(dispatch.accept_request(Side::Right).await.unwrap(), CommandOutcome::Sent);
        assert_eq!(dispatch.cancel_request(Side::Left).await.unwrap(), CommandOutcome::Sent);
        assert_eq!(dispatch.reject_request(Side::Right).await.unwrap(), CommandOutcome::Sent);

        let after = tx.borrow().clone();
        assert_eq!(after, before);
        assert!(after.requests.is_empty());
        assert_eq!(
            *recorder.actions.lock(),
            vec![
                Action::SendRequest(Side::Left),
                Action::AcceptRequest(Side::Right),
                Action::CancelRequest(Side::Left),
                Action::RejectRequest(Side::Right),
            ]
        );
    }

    #[tokio::test]
    async fn test_request_needs_neighbor() {
        let recorder = Arc::new(Recorder::default());
        let mut lonely = state(true);
        lonely.neighbors.left = None;
        let (dispatch, _tx) = dispatcher(recorder.clone(), lonely);

        assert_eq!(
            dispatch.send_request(Side::Left).await.unwrap(),
            CommandOutcome::Skipped(Precondition::NoNeighbor(Side::Left))
        );
        assert!(recorder.actions.lock().is_empty());
    }

    #[tokio::test]
    async fn test_lock_unlock_preconditions() {
        let recorder = Arc::new(Recorder::default());
        let (dispatch, tx) = dispatcher(recorder.clone(), state(false));

        assert_eq!(
            dispatch.unlock().await.unwrap(),
            CommandOutcome::Skipped(Precondition::Unlocked)
        );
        assert_eq!(dispatch.lock().await.unwrap(), CommandOutcome::Sent);
        assert!(!tx.borrow().me.locked, "lock waits for the broadcast");

        tx.send_modify(|s| s.me.locked = true);
        assert_eq!(dispatch.lock().await.unwrap(), CommandOutcome::Skipped(Precondition::Locked));
        assert_eq!(dispatch.unlock().await.unwrap(), CommandOutcome::Sent);
        assert_eq!(*recorder.actions.lock(), vec![Action::Lock, Action::Unlock]);
    }

    #[tokio::test]
    async fn test_failed_action_propagates() {
        let recorder = Arc::new(Recorder::default());
        *recorder.reply.lock() = Some(Err(TransportError::Server(500)));
        let (dispatch, _tx) = dispatcher(recorder, state(false));
        assert_eq!(dispatch.leave().await, Err(TransportError::Server(500)));
    }

    #[test]
    fn test_update_text_publishes_every_change() {
        let recorder = Arc::new(Recorder::default());
        let (dispatch, _tx) = dispatcher(recorder.clone(), state(false));
        dispatch.update_text("a").unwrap();
        dispatch.update_text("ab").unwrap();
        assert_eq!(*recorder.texts.lock(), vec!["a".to_string(), "ab".to_string()]);
    }
}
