use std::path::PathBuf;

use thiserror::Error;
use trainer_core::{MoveError, TranslateError};
use uci_session::SessionError;

/// Errors from auto-play, coaching and manual analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoachError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Move(#[from] MoveError),

    #[error(transparent)]
    Advice(#[from] AdviceError),

    #[error("engine gave no score for {fen}")]
    NoScore { fen: String },

    #[error("it is the engine's turn")]
    NotYourTurn,

    #[error("trainer has stopped")]
    TrainerStopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdviceError {
    #[error("advice request failed: {0}")]
    Request(String),

    #[error("advice service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("advice response could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for AdviceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AdviceError::Decode(e.to_string())
        } else {
            AdviceError::Request(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config")]
    Parse(#[from] toml::de::Error),
}
