use std::fmt;

use trainer_core::{GameStatus, Move, Revision, Side};

use crate::coaching::CoachingEvaluation;
use crate::error::CoachError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mover {
    Human,
    Engine,
}

/// Game-facing output of the trainer.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainerEvent {
    MoveApplied {
        revision: Revision,
        mv: Move,
        by: Mover,
        fen: String,
    },
    EngineThinking {
        revision: Revision,
    },
    Evaluation(CoachingEvaluation),
    Advice {
        revision: Revision,
        mv: String,
        text: String,
    },
    /// Result of a manual analysis of the current position.
    Analysis {
        fen: String,
        best_move: String,
        /// Centipawns, positive favours White.
        score: Option<i32>,
        depth: Option<u32>,
        pv: Vec<String>,
    },
    GameOver {
        status: GameStatus,
        winner: Option<Side>,
    },
    Reset {
        revision: Revision,
    },
    AutoPlay {
        enabled: bool,
    },
}

/// Which part of the trainer a fault came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSource {
    AutoPlay,
    Coaching,
    Advice,
    Analysis,
}

impl fmt::Display for FaultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultSource::AutoPlay => "auto-play",
            FaultSource::Coaching => "coaching",
            FaultSource::Advice => "advice",
            FaultSource::Analysis => "analysis",
        };
        f.write_str(name)
    }
}

/// A failure of background engine work. Never affects the game state.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub source: FaultSource,
    pub error: CoachError,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}
