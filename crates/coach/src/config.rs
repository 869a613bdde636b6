//! Trainer configuration.
//!
//! Loaded from TOML with every field defaulted, so an empty file (or no file
//! at all) gives a playable setup against a `stockfish` on `PATH`:
//!
//! ```toml
//! [engine]
//! command = "stockfish"
//! analyze_timeout_ms = 10000
//!
//! [play]
//! auto_play = true
//! engine_side = "black"
//! skill = 10
//! movetime_ms = 1000
//!
//! [coaching]
//! depth = 12
//! advice_url = "http://localhost:3001/api/coach"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use trainer_core::Side;
use uci_session::SessionConfig;

use crate::coaching::ScoreConvention;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub engine: EngineSettings,
    pub play: PlaySettings,
    pub coaching: CoachingSettings,
}

impl TrainerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// How to launch and talk to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub command: String,
    pub args: Vec<String>,
    pub handshake_timeout_ms: u64,
    pub analyze_timeout_ms: u64,
    pub play_timeout_ms: u64,
    pub drain_timeout_ms: u64,
    pub threads: u32,
    pub hash_mb: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            command: "stockfish".to_string(),
            args: Vec::new(),
            handshake_timeout_ms: 5_000,
            analyze_timeout_ms: 10_000,
            play_timeout_ms: 15_000,
            drain_timeout_ms: 2_000,
            threads: 1,
            hash_mb: 16,
        }
    }
}

impl EngineSettings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            analyze_timeout: Duration::from_millis(self.analyze_timeout_ms),
            play_timeout: Duration::from_millis(self.play_timeout_ms),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
            options: vec![
                ("MultiPV".to_string(), "1".to_string()),
                ("Threads".to_string(), self.threads.to_string()),
                ("Hash".to_string(), self.hash_mb.to_string()),
            ],
        }
    }
}

/// Auto-play settings for the engine's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaySettings {
    pub auto_play: bool,
    pub engine_side: Side,
    /// `Skill Level` sent before each move; `None` plays at full strength.
    pub skill: Option<u8>,
    pub movetime_ms: u64,
}

impl Default for PlaySettings {
    fn default() -> Self {
        Self {
            auto_play: true,
            engine_side: Side::Black,
            skill: Some(10),
            movetime_ms: 1_000,
        }
    }
}

impl PlaySettings {
    pub fn movetime(&self) -> Duration {
        Duration::from_millis(self.movetime_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachingSettings {
    pub enabled: bool,
    pub depth: u32,
    pub convention: ScoreConvention,
    /// Times an analysis is retried after `EngineBusy` before it is reported.
    pub busy_retries: u32,
    pub advice_url: Option<String>,
    pub advice_timeout_ms: u64,
}

impl Default for CoachingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            depth: 12,
            convention: ScoreConvention::SideToMove,
            busy_retries: 8,
            advice_url: None,
            advice_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
