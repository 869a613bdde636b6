//! Position Store: the one authoritative game state.
//!
//! Holds every position snapshot from the initial one, the applied moves and
//! the derived status. All mutation goes through `apply_move*` and `reset`,
//! each of which either fully succeeds or leaves the store untouched.

use std::fmt;

use cozy_chess::{BitBoard, Color, Square};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::MoveError;
use crate::rules;
use crate::types::{opponent, GameStatus, Move, Position};

/// Identifies one state of the store. `game` changes on reset, `ply` on every
/// applied move; work tagged with a revision is stale once the store moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Revision {
    pub game: u64,
    pub ply: u32,
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.game, self.ply)
    }
}

/// Applied moves in play order plus the resulting status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    moves: Vec<Move>,
    status: GameStatus,
    winner: Option<Color>,
}

impl GameRecord {
    fn new() -> Self {
        Self {
            moves: Vec::new(),
            status: GameStatus::InProgress,
            winner: None,
        }
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn last_move(&self) -> Option<&Move> {
        self.moves.last()
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Set only on checkmate.
    pub fn winner(&self) -> Option<Color> {
        self.winner
    }

    /// SAN move list formatted as `1. e4 e5 2. Nf3`.
    pub fn move_text(&self, first_ply: u32) -> String {
        let mut out = String::new();
        for (i, mv) in self.moves.iter().enumerate() {
            let ply = first_ply + i as u32;
            if ply % 2 == 0 {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(&format!("{}. ", ply / 2 + 1));
            } else if i == 0 {
                out.push_str(&format!("{}... ", ply / 2 + 1));
            } else {
                out.push(' ');
            }
            out.push_str(&mv.to_string());
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct PositionStore {
    positions: Vec<Position>,
    record: GameRecord,
    game: u64,
}

impl Default for PositionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionStore {
    /// A store at the standard starting position.
    pub fn new() -> Self {
        Self::with_position(Position::startpos())
    }

    /// A store starting from an arbitrary position.
    pub fn with_position(initial: Position) -> Self {
        let mut store = Self {
            positions: vec![initial],
            record: GameRecord::new(),
            game: 0,
        };
        store.record.status = rules::status(store.current_position(), &store.positions);
        store
    }

    pub fn current_position(&self) -> &Position {
        // `positions` always holds at least the initial snapshot.
        &self.positions[self.positions.len() - 1]
    }

    /// Every snapshot of the current game; index is the ply it was reached at.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn record(&self) -> &GameRecord {
        &self.record
    }

    pub fn revision(&self) -> Revision {
        Revision {
            game: self.game,
            ply: self.record.len() as u32,
        }
    }

    /// Apply a move against the current position.
    pub fn apply_move(&mut self, mv: &Move) -> Result<&GameRecord, MoveError> {
        if self.record.status.is_over() {
            return Err(MoveError::GameOver(self.record.status));
        }

        let current = self.current_position();
        let mover = current.turn();
        let (next, confirmed) = rules::play(current, mv)?;

        debug!(mv = %confirmed, fen = next.fen(), "Applying move");

        self.positions.push(next);
        self.record.moves.push(confirmed);

        let status = rules::status(self.current_position(), &self.positions);
        self.record.status = status;
        if status == GameStatus::Checkmate {
            self.record.winner = Some(mover);
        }
        if status.is_over() {
            info!(%status, plies = self.record.len(), "Game finished");
        }

        Ok(&self.record)
    }

    /// Apply a move only if the store is still at `expected`.
    pub fn apply_move_at(
        &mut self,
        expected: Revision,
        mv: &Move,
    ) -> Result<&GameRecord, MoveError> {
        let current = self.revision();
        if current != expected {
            return Err(MoveError::Stale { expected, current });
        }
        self.apply_move(mv)
    }

    /// Discard the game and return to the standard starting position.
    pub fn reset(&mut self) {
        self.positions = vec![Position::startpos()];
        self.record = GameRecord::new();
        self.game += 1;
        info!(game = self.game, "Position store reset");
    }

    /// Destinations reachable by the piece on `square` for the side to move.
    pub fn legal_destinations(&self, square: Square) -> BitBoard {
        rules::legal_moves(self.current_position())
            .into_iter()
            .filter(|mv| mv.from == square)
            .fold(BitBoard::EMPTY, |acc, mv| acc | mv.to.bitboard())
    }

    /// Side that made the last move; `None` before any move.
    pub fn last_mover(&self) -> Option<Color> {
        if self.record.is_empty() {
            None
        } else {
            Some(opponent(self.current_position().turn()))
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
