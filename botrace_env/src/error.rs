//! Error types for the BotRace environment abstraction.

use thiserror::Error;

/// Errors that can occur talking to the environment.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Activity backend could not be reached
    #[error("Activity source unavailable: {0}")]
    SourceUnavailable(String),
}

impl EnvError {
    /// Creates an unavailable-source error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }
}
