use thiserror::Error;

use crate::store::Revision;
use crate::types::GameStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("invalid FEN: {0}")]
    InvalidFen(String),
}

/// Rejection of a move at the store boundary. The store is unchanged whenever
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("illegal move {mv} in position {fen}")]
    Illegal { mv: String, fen: String },
    #[error("game is already over ({0})")]
    GameOver(GameStatus),
    #[error("move was produced for revision {expected} but the store is at {current}")]
    Stale { expected: Revision, current: Revision },
}

/// Failure to map engine notation onto a legal move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("malformed move text `{0}`")]
    Syntax(String),
    #[error("`{notation}` does not match any legal move in {fen}")]
    Unresolved { notation: String, fen: String },
}
