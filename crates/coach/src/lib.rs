//! Orchestration on top of the engine session.
//!
//! - [`autoplay`]: decides when the engine moves for its side
//! - [`coaching`]: before/after analysis of human moves
//! - [`advice`]: natural-language advice over HTTP
//! - [`trainer`]: the event loop tying store, session and both of the above together

pub mod advice;
pub mod autoplay;
pub mod coaching;
pub mod config;
pub mod error;
pub mod events;
pub mod trainer;

pub use advice::{AdviceGenerator, AdviceRequest, HttpAdviceClient};
pub use autoplay::{should_play, AutoPlay};
pub use coaching::{
    centipawns, mover_relative, AfterScore, CoachingEvaluation, CoachingJob, CoachingRun,
    Evaluator, MoveQuality, ScoreConvention, MATE_SCORE,
};
pub use config::{CoachingSettings, EngineSettings, PlaySettings, TrainerConfig};
pub use error::{AdviceError, CoachError, ConfigError};
pub use events::{Fault, FaultSource, Mover, TrainerEvent};
pub use trainer::{GameSnapshot, Trainer, TrainerHandle, TrainerOutputs};
