//! Game-state core for the chess trainer.
//!
//! Chess legality is delegated to `cozy-chess`; this crate wraps it into the
//! pieces the orchestration layer needs:
//! - [`PositionStore`]: the authoritative position, move history and status
//! - [`uci`]: the Move Translator between engine coordinates and confirmed moves
//! - [`rules`]: legality, SAN rendering and terminal-status detection

pub mod error;
pub mod rules;
pub mod store;
pub mod types;
pub mod uci;

pub use error::*;
pub use store::*;
pub use types::*;
pub use uci::{from_engine_notation, parse_human_move, to_engine_notation, translate_line};

// Rules-library types that appear in this crate's public API.
pub use cozy_chess::{BitBoard, Color, Piece, Square};
