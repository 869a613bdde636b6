//! Text rendering of trainer output.

use coach::{CoachingEvaluation, GameSnapshot, Mover, TrainerEvent};
use trainer_core::{Color, Piece, Position, Square};

/// One line per event; `None` for events not worth printing.
pub fn describe(event: &TrainerEvent) -> Option<String> {
    let line = match event {
        TrainerEvent::MoveApplied { mv, by: Mover::Engine, .. } => format!("Engine plays {mv}"),
        TrainerEvent::MoveApplied { .. } => return None,
        TrainerEvent::EngineThinking { .. } => "Engine is thinking...".to_string(),
        TrainerEvent::Evaluation(eval) => evaluation_line(eval),
        TrainerEvent::Advice { mv, text, .. } => format!("Coach on {mv}: {text}"),
        TrainerEvent::Analysis { best_move, score, depth, pv, .. } => {
            let mut line = format!("Best: {best_move}");
            if let Some(score) = score {
                line.push_str(&format!("  eval {}", pawns(*score)));
            }
            if let Some(depth) = depth {
                line.push_str(&format!("  depth {depth}"));
            }
            if !pv.is_empty() {
                line.push_str(&format!("  line {}", pv.join(" ")));
            }
            line
        }
        TrainerEvent::GameOver { status, winner } => match winner {
            Some(side) => format!("Game over: {status}, {side} wins"),
            None => format!("Game over: {status}"),
        },
        TrainerEvent::Reset { .. } => "New game.".to_string(),
        TrainerEvent::AutoPlay { enabled: true } => "Auto-play on.".to_string(),
        TrainerEvent::AutoPlay { enabled: false } => "Auto-play off.".to_string(),
    };
    Some(line)
}

fn evaluation_line(eval: &CoachingEvaluation) -> String {
    let mut line = format!(
        "Move {} ({}): {} -> {} [{:?}]",
        eval.revision.ply,
        eval.mv,
        pawns(eval.eval_before),
        pawns(eval.eval_after),
        eval.quality
    );
    if eval.best_move != eval.mv {
        line.push_str(&format!(", engine preferred {}", eval.best_move));
    }
    line
}

/// Centipawns as signed pawns, `+0.35`.
pub fn pawns(cp: i32) -> String {
    if cp.abs() >= coach::MATE_SCORE - 1_000 {
        return if cp > 0 { "+mate".into() } else { "-mate".into() };
    }
    format!("{:+.2}", f64::from(cp) / 100.0)
}

/// ASCII board from White's side, with the move list underneath.
pub fn render(snapshot: &GameSnapshot) -> String {
    let mut out = String::new();
    if let Ok(position) = Position::from_fen(&snapshot.fen) {
        out.push_str(&board(&position));
    }
    out.push_str(&format!("FEN: {}\n", snapshot.fen));
    if !snapshot.move_text.is_empty() {
        out.push_str(&format!("Moves: {}\n", snapshot.move_text));
    }
    out.push_str(&format!(
        "Status: {}  |  engine plays {} (auto-play {})\n",
        snapshot.status,
        snapshot.engine_side,
        if snapshot.auto_play { "on" } else { "off" }
    ));
    out
}

fn board(position: &Position) -> String {
    let board = position.board();
    let mut out = String::new();
    for rank in (0..8).rev() {
        out.push_str(&format!("{} ", rank + 1));
        for file in 0..8 {
            let square = Square::index(rank * 8 + file);
            let glyph = match (board.piece_on(square), board.color_on(square)) {
                (Some(piece), Some(color)) => piece_glyph(piece, color),
                _ => '.',
            };
            out.push(' ');
            out.push(glyph);
        }
        out.push('\n');
    }
    out.push_str("   a b c d e f g h\n");
    out
}

fn piece_glyph(piece: Piece, color: Color) -> char {
    let glyph = match piece {
        Piece::Pawn => 'p',
        Piece::Knight => 'n',
        Piece::Bishop => 'b',
        Piece::Rook => 'r',
        Piece::Queen => 'q',
        Piece::King => 'k',
    };
    if color == Color::White {
        glyph.to_ascii_uppercase()
    } else {
        glyph
    }
}

#[cfg(test)]
#[path = "display_tests.rs"]
mod display_tests;
