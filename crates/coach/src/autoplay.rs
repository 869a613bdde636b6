//! Auto-play coordinator: lets the engine move for its side.

use std::time::Duration;

use tracing::{debug, info};
use trainer_core::{
    from_engine_notation, Color, GameStatus, Move, MoveError, PositionStore, Revision, Side,
};
use uci_session::{EngineSession, Pending, SearchOutcome, SessionError, SessionState};

use crate::config::PlaySettings;
use crate::error::CoachError;

/// Whether the engine should be asked to move right now.
///
/// All four conditions must hold: the session is idle, the game is still
/// running, it is the engine's turn, and auto-play is switched on.
pub fn should_play(
    enabled: bool,
    engine_side: Side,
    session: SessionState,
    status: GameStatus,
    turn: Color,
) -> bool {
    enabled
        && session == SessionState::Ready
        && status == GameStatus::InProgress
        && Side::from(turn) == engine_side
}

#[derive(Debug, Clone)]
pub struct AutoPlay {
    enabled: bool,
    engine_side: Side,
    skill: Option<u8>,
    movetime: Duration,
    in_flight: Option<Revision>,
    /// Revision whose engine move failed; not retried until the game moves on.
    failed: Option<Revision>,
}

impl AutoPlay {
    pub fn new(settings: &PlaySettings) -> Self {
        Self {
            enabled: settings.auto_play,
            engine_side: settings.engine_side,
            skill: settings.skill,
            movetime: settings.movetime(),
            in_flight: None,
            failed: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Toggling also clears a previous failure, so it doubles as "try again".
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.failed = None;
    }

    pub fn engine_side(&self) -> Side {
        self.engine_side
    }

    /// Revision a `play` request is outstanding for.
    pub fn in_flight(&self) -> Option<Revision> {
        self.in_flight
    }

    /// True when it is the engine's turn under auto-play, whatever the session is doing.
    pub fn engine_to_move(&self, store: &PositionStore) -> bool {
        self.enabled
            && store.record().status() == GameStatus::InProgress
            && Side::from(store.current_position().turn()) == self.engine_side
    }

    /// Issue a `play` request if the engine should move.
    ///
    /// A busy session is not an error: the request is dropped and the caller
    /// re-evaluates on the next position change or `Ready` transition.
    pub fn trigger(
        &mut self,
        session: &EngineSession,
        store: &PositionStore,
    ) -> Result<Option<(Revision, Pending)>, CoachError> {
        if self.in_flight.is_some() || self.failed == Some(store.revision()) {
            return Ok(None);
        }
        let position = store.current_position();
        if !should_play(
            self.enabled,
            self.engine_side,
            session.state(),
            store.record().status(),
            position.turn(),
        ) {
            return Ok(None);
        }

        match session.play(position, self.skill, self.movetime) {
            Ok(pending) => {
                let revision = store.revision();
                debug!(%revision, request_id = pending.id(), "Engine asked to move");
                self.in_flight = Some(revision);
                Ok(Some((revision, pending)))
            }
            Err(SessionError::EngineBusy) => {
                debug!("Engine busy; auto-play skipped");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply the engine's reply for `revision`.
    ///
    /// Returns `Ok(None)` when the game was reset while the engine was
    /// thinking; the reply is then dropped. A reply for an earlier ply of the
    /// same game is rejected as stale.
    pub fn complete(
        &mut self,
        store: &mut PositionStore,
        revision: Revision,
        result: Result<SearchOutcome, SessionError>,
    ) -> Result<Option<Move>, CoachError> {
        if self.in_flight == Some(revision) {
            self.in_flight = None;
        }
        let current = store.revision();
        if current.game != revision.game {
            debug!(%revision, "Engine move for a previous game dropped");
            return Ok(None);
        }
        if current != revision {
            return Err(MoveError::Stale { expected: revision, current }.into());
        }

        match apply_reply(store, result) {
            Ok(mv) => {
                info!(%mv, %revision, "Engine moved");
                Ok(Some(mv))
            }
            Err(e) => {
                self.failed = Some(revision);
                Err(e)
            }
        }
    }
}

fn apply_reply(
    store: &mut PositionStore,
    result: Result<SearchOutcome, SessionError>,
) -> Result<Move, CoachError> {
    let outcome = result?;
    let mv = from_engine_notation(&outcome.best_move, store.current_position())?;
    store.apply_move(&mv)?;
    Ok(store.record().last_move().cloned().unwrap_or(mv))
}

#[cfg(test)]
#[path = "autoplay_tests.rs"]
mod autoplay_tests;
