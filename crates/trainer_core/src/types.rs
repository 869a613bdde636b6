//! Value types shared by the store, the translator and the engine layer.

use std::fmt;

use cozy_chess::{Board, Color, Piece, Square};
use serde::{Deserialize, Serialize};

use crate::error::PositionError;

/// An immutable board snapshot.
///
/// A new `Position` is produced for every applied move; nothing mutates one
/// in place. Equality is by FEN, so two snapshots reached by different move
/// orders compare equal when every FEN field agrees.
#[derive(Debug, Clone)]
pub struct Position {
    board: Board,
    fen: String,
}

impl Position {
    /// The standard starting position.
    pub fn startpos() -> Self {
        Self::from_board(Board::default())
    }

    /// Parse a full six-field FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, PositionError> {
        let board = Board::from_fen(fen.trim(), false)
            .map_err(|_| PositionError::InvalidFen(fen.trim().to_string()))?;
        Ok(Self::from_board(board))
    }

    pub(crate) fn from_board(board: Board) -> Self {
        let fen = board.to_string();
        Self { board, fen }
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    /// The rules-library board backing this snapshot.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Side to move.
    pub fn turn(&self) -> Color {
        self.board.side_to_move()
    }

    /// Half-moves played since the start of the game, derived from the
    /// fullmove counter and the side to move.
    pub fn ply_count(&self) -> u32 {
        let full = u32::from(self.board.fullmove_number().max(1));
        (full - 1) * 2 + u32::from(self.turn() == Color::Black)
    }

    pub fn in_check(&self) -> bool {
        !self.board.checkers().is_empty()
    }

    /// Zobrist key, used for repetition detection.
    pub fn key(&self) -> u64 {
        self.board.hash()
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::startpos()
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.fen == other.fen
    }
}

impl Eq for Position {}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen)
    }
}

/// A move in standard coordinates.
///
/// Castling is always king-from/king-to (`e1g1`), never the king-takes-rook
/// encoding the rules library uses internally. `notation` holds the SAN once
/// legality has been confirmed against a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Piece>,
    pub notation: Option<String>,
}

impl Move {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
            notation: None,
        }
    }

    pub fn with_promotion(mut self, piece: Piece) -> Self {
        self.promotion = Some(piece);
        self
    }

    /// SAN, present only on moves confirmed legal.
    pub fn san(&self) -> Option<&str> {
        self.notation.as_deref()
    }

    /// True when both moves name the same (from, to, promotion) triple.
    pub fn same_squares(&self, other: &Move) -> bool {
        self.from == other.from && self.to == other.to && self.promotion == other.promotion
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.notation {
            Some(san) => f.write_str(san),
            None => {
                write!(f, "{}{}", self.from, self.to)?;
                if let Some(p) = self.promotion {
                    write!(f, "{}", promotion_char(p))?;
                }
                Ok(())
            }
        }
    }
}

/// Lowercase promotion suffix used in engine coordinate notation.
pub fn promotion_char(piece: Piece) -> char {
    match piece {
        Piece::Queen => 'q',
        Piece::Rook => 'r',
        Piece::Bishop => 'b',
        Piece::Knight => 'n',
        Piece::Pawn => 'p',
        Piece::King => 'k',
    }
}

/// Why a game ended in a draw other than stalemate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrawReason {
    FiftyMoves,
    Repetition,
    InsufficientMaterial,
}

/// Game status. Once it leaves `InProgress` it never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    InProgress,
    Checkmate,
    Stalemate,
    Draw(DrawReason),
}

impl GameStatus {
    pub fn is_over(self) -> bool {
        self != GameStatus::InProgress
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::InProgress => write!(f, "in progress"),
            GameStatus::Checkmate => write!(f, "checkmate"),
            GameStatus::Stalemate => write!(f, "stalemate"),
            GameStatus::Draw(DrawReason::FiftyMoves) => write!(f, "draw by fifty-move rule"),
            GameStatus::Draw(DrawReason::Repetition) => write!(f, "draw by threefold repetition"),
            GameStatus::Draw(DrawReason::InsufficientMaterial) => {
                write!(f, "draw by insufficient material")
            }
        }
    }
}

/// Serializable stand-in for the rules library's `Color`, used in config and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => write!(f, "White"),
            Side::Black => write!(f, "Black"),
        }
    }
}

pub(crate) fn opponent(color: Color) -> Color {
    match color {
        Color::White => Color::Black,
        Color::Black => Color::White,
    }
}
