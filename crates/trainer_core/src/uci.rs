//! Move Translator: engine coordinate notation <-> confirmed moves.
//!
//! Engine text carries only squares and an optional promotion letter, so every
//! parse is matched against the legal moves of the position it refers to. A
//! text that names no legal move is a protocol fault; it is never replaced by
//! a "closest" move.

use cozy_chess::{Piece, Square};
use tracing::warn;

use crate::error::TranslateError;
use crate::rules;
use crate::types::{promotion_char, Move, Position};

/// Render a move legal in `position` as engine coordinate notation.
///
/// The move is checked against `position` first so that nothing illegal is
/// ever sent down the engine channel.
pub fn to_engine_notation(mv: &Move, position: &Position) -> Result<String, TranslateError> {
    let (_, confirmed) = rules::resolve(position, mv).ok_or_else(|| TranslateError::Unresolved {
        notation: format_coordinates(mv),
        fen: position.fen().to_string(),
    })?;
    Ok(format_coordinates(&confirmed))
}

/// Resolve engine coordinate notation against the legal moves of `position`.
pub fn from_engine_notation(text: &str, position: &Position) -> Result<Move, TranslateError> {
    let wanted = parse_coordinates(text)?;
    match rules::resolve(position, &wanted) {
        Some((_, confirmed)) => Ok(confirmed),
        None => {
            warn!(notation = text, fen = position.fen(), "Engine move does not resolve");
            Err(TranslateError::Unresolved {
                notation: text.trim().to_string(),
                fen: position.fen().to_string(),
            })
        }
    }
}

/// Human input: engine coordinates first, SAN as a fallback.
pub fn parse_human_move(text: &str, position: &Position) -> Result<Move, TranslateError> {
    match from_engine_notation(text, position) {
        Ok(mv) => Ok(mv),
        Err(coord_err) => rules::find_san(position, text).ok_or(match coord_err {
            TranslateError::Syntax(_) => TranslateError::Unresolved {
                notation: text.trim().to_string(),
                fen: position.fen().to_string(),
            },
            other => other,
        }),
    }
}

/// Translate a whole principal variation, stopping at the first move that
/// fails to resolve.
pub fn translate_line(line: &[String], position: &Position) -> Result<Vec<Move>, TranslateError> {
    let mut pos = position.clone();
    let mut out = Vec::with_capacity(line.len());
    for text in line {
        let mv = from_engine_notation(text, &pos)?;
        let (next, confirmed) = rules::play(&pos, &mv).map_err(|_| TranslateError::Unresolved {
            notation: text.clone(),
            fen: pos.fen().to_string(),
        })?;
        out.push(confirmed);
        pos = next;
    }
    Ok(out)
}

/// Split `e2e4` / `e7e8q` into its parts without consulting any position.
pub fn parse_coordinates(text: &str) -> Result<Move, TranslateError> {
    let txt = text.trim();
    if !txt.is_ascii() || !(4..=5).contains(&txt.len()) {
        return Err(TranslateError::Syntax(txt.to_string()));
    }
    let from: Square = txt[0..2]
        .parse()
        .map_err(|_| TranslateError::Syntax(txt.to_string()))?;
    let to: Square = txt[2..4]
        .parse()
        .map_err(|_| TranslateError::Syntax(txt.to_string()))?;
    let promotion = match txt.as_bytes().get(4) {
        None => None,
        Some(b) => Some(match b.to_ascii_lowercase() {
            b'q' => Piece::Queen,
            b'r' => Piece::Rook,
            b'b' => Piece::Bishop,
            b'n' => Piece::Knight,
            _ => return Err(TranslateError::Syntax(txt.to_string())),
        }),
    };
    Ok(Move {
        from,
        to,
        promotion,
        notation: None,
    })
}

fn format_coordinates(mv: &Move) -> String {
    let mut s = format!("{}{}", mv.from, mv.to);
    if let Some(p) = mv.promotion {
        s.push(promotion_char(p));
    }
    s
}

#[cfg(test)]
#[path = "uci_tests.rs"]
mod uci_tests;
