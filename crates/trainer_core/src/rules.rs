//! Adapter over the cozy-chess rules library.
//!
//! Everything that asks "is this legal", "what does this look like in SAN" or
//! "is the game over" goes through here. Moves leave this module in standard
//! coordinates with castling as a two-square king step.

use cozy_chess::{Board, File, Piece, Square};

use crate::error::MoveError;
use crate::types::{DrawReason, GameStatus, Move, Position};

/// All legal moves in `position`, in standard coordinates with SAN attached.
pub fn legal_moves(position: &Position) -> Vec<Move> {
    let board = position.board();
    let raw = raw_legal_moves(board);
    raw.iter()
        .map(|&mv| {
            let mut out = standardize(board, mv);
            out.notation = Some(render_san(board, mv, &raw));
            out
        })
        .collect()
}

/// Find the legal move matching the exact (from, to, promotion) triple.
///
/// Returns the library's move alongside the standardized one so callers can
/// apply it without a second search.
pub(crate) fn resolve(position: &Position, wanted: &Move) -> Option<(cozy_chess::Move, Move)> {
    let board = position.board();
    let raw = raw_legal_moves(board);
    raw.iter().copied().find_map(|mv| {
        let std = standardize(board, mv);
        if std.same_squares(wanted) {
            let mut confirmed = std;
            confirmed.notation = Some(render_san(board, mv, &raw));
            Some((mv, confirmed))
        } else {
            None
        }
    })
}

/// Apply `mv` to `position`, producing the next snapshot and the confirmed move.
pub fn play(position: &Position, mv: &Move) -> Result<(Position, Move), MoveError> {
    let (raw, confirmed) = resolve(position, mv).ok_or_else(|| MoveError::Illegal {
        mv: mv.to_string(),
        fen: position.fen().to_string(),
    })?;
    let mut board = position.board().clone();
    board.play_unchecked(raw);
    Ok((Position::from_board(board), confirmed))
}

/// Match SAN text (check and mate suffixes optional) against the legal moves.
pub fn find_san(position: &Position, san: &str) -> Option<Move> {
    let wanted = strip_suffix(san);
    if wanted.is_empty() {
        return None;
    }
    legal_moves(position)
        .into_iter()
        .find(|mv| mv.san().map(strip_suffix) == Some(wanted))
}

/// Terminal status of `position` given every position of the game so far
/// (the current one included).
pub fn status(position: &Position, history: &[Position]) -> GameStatus {
    let board = position.board();

    if !has_legal_moves(board) {
        return if board.checkers().is_empty() {
            GameStatus::Stalemate
        } else {
            GameStatus::Checkmate
        };
    }

    if board.halfmove_clock() >= 100 {
        return GameStatus::Draw(DrawReason::FiftyMoves);
    }

    let key = position.key();
    if history.iter().filter(|p| p.key() == key).count() >= 3 {
        return GameStatus::Draw(DrawReason::Repetition);
    }

    if is_insufficient_material(board) {
        return GameStatus::Draw(DrawReason::InsufficientMaterial);
    }

    GameStatus::InProgress
}

/// Bare kings, or kings plus a single minor piece.
pub fn is_insufficient_material(board: &Board) -> bool {
    let heavy = board.pieces(Piece::Pawn) | board.pieces(Piece::Rook) | board.pieces(Piece::Queen);
    let minors = board.pieces(Piece::Knight) | board.pieces(Piece::Bishop);
    heavy.is_empty() && minors.len() <= 1
}

pub(crate) fn has_legal_moves(board: &Board) -> bool {
    board.generate_moves(|moves| moves.into_iter().next().is_some())
}

fn raw_legal_moves(board: &Board) -> Vec<cozy_chess::Move> {
    let mut moves = Vec::with_capacity(64);
    board.generate_moves(|piece_moves| {
        moves.extend(piece_moves);
        false
    });
    moves
}

fn is_castle(board: &Board, mv: cozy_chess::Move) -> bool {
    board.piece_on(mv.from) == Some(Piece::King)
        && board.colors(board.side_to_move()).has(mv.to)
}

fn castles_kingside(mv: cozy_chess::Move) -> bool {
    (mv.to.file() as usize) > (mv.from.file() as usize)
}

fn standardize(board: &Board, mv: cozy_chess::Move) -> Move {
    let to = if is_castle(board, mv) {
        let file = if castles_kingside(mv) { File::G } else { File::C };
        Square::new(file, mv.from.rank())
    } else {
        mv.to
    };
    Move {
        from: mv.from,
        to,
        promotion: mv.promotion,
        notation: None,
    }
}

fn piece_letter(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'P',
        Piece::Knight => 'N',
        Piece::Bishop => 'B',
        Piece::Rook => 'R',
        Piece::Queen => 'Q',
        Piece::King => 'K',
    }
}

fn render_san(board: &Board, mv: cozy_chess::Move, legal: &[cozy_chess::Move]) -> String {
    let Some(piece) = board.piece_on(mv.from) else {
        return mv.to_string();
    };

    let mut san = String::new();

    if is_castle(board, mv) {
        san.push_str(if castles_kingside(mv) { "O-O" } else { "O-O-O" });
    } else {
        let from = mv.from.to_string();
        let is_capture = board.occupied().has(mv.to)
            || (piece == Piece::Pawn && mv.from.file() != mv.to.file());

        if piece == Piece::Pawn {
            if is_capture {
                san.push_str(&from[..1]);
            }
        } else {
            san.push(piece_letter(piece));

            // Other pieces of the same kind that can also reach the target.
            let rivals: Vec<Square> = legal
                .iter()
                .filter(|o| {
                    o.to == mv.to && o.from != mv.from && board.piece_on(o.from) == Some(piece)
                })
                .map(|o| o.from)
                .collect();
            if !rivals.is_empty() {
                let shares_file = rivals.iter().any(|s| s.file() == mv.from.file());
                let shares_rank = rivals.iter().any(|s| s.rank() == mv.from.rank());
                if !shares_file {
                    san.push_str(&from[..1]);
                } else if !shares_rank {
                    san.push_str(&from[1..]);
                } else {
                    san.push_str(&from);
                }
            }
        }

        if is_capture {
            san.push('x');
        }
        san.push_str(&mv.to.to_string());

        if let Some(promo) = mv.promotion {
            san.push('=');
            san.push(piece_letter(promo));
        }
    }

    let mut after = board.clone();
    after.play_unchecked(mv);
    if !after.checkers().is_empty() {
        san.push(if has_legal_moves(&after) { '+' } else { '#' });
    }

    san
}

fn strip_suffix(san: &str) -> &str {
    san.trim().trim_end_matches(&['+', '#', '!', '?'][..])
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod rules_tests;
