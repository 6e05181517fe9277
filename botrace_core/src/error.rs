//! Error types for the race core.

use thiserror::Error;

/// Invariant violations detected by the speed derivation engine.
///
/// These never come from live data directly: the activity source and the
/// controller normalize inputs first, so seeing one means a caller bug.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpeedError {
    #[error("Reputation must be finite and non-negative, got {0}")]
    InvalidReputation(f64),

    #[error("The {which} activity window has zero length")]
    InvalidWindow { which: &'static str },

    #[error("Recent window ({recent_ms}ms) must be shorter than baseline window ({baseline_ms}ms)")]
    InvertedWindows { recent_ms: u128, baseline_ms: u128 },
}

/// Errors surfaced by configuration and race setup.
#[derive(Debug, Error)]
pub enum RaceError {
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl RaceError {
    /// Creates a config validation error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
