//! Race configuration.
//!
//! Every product constant of the race (cadence, tie window, restart delay,
//! track geometry, scoring table) lives here so it can be tuned from a TOML
//! file instead of being baked into the controller.

use crate::competitor::TrackConfig;
use crate::error::RaceError;
use crate::speed::SpeedBalance;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the race lifecycle controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    /// Number of agents requested per race
    pub roster_size: usize,

    #[serde(rename = "evaluation_interval_min_ms", with = "millis")]
    pub evaluation_interval_min: Duration,
    #[serde(rename = "evaluation_interval_max_ms", with = "millis")]
    pub evaluation_interval_max: Duration,

    /// Delay between race-over and the next race
    #[serde(rename = "restart_delay_ms", with = "millis")]
    pub restart_delay: Duration,

    /// Finishers within this window of the first finish share the win
    #[serde(rename = "tie_tolerance_ms", with = "millis")]
    pub tie_tolerance: Duration,

    /// The race ends when this many competitors are still running
    pub race_over_remaining: usize,

    #[serde(rename = "recent_window_ms", with = "millis")]
    pub recent_window: Duration,
    #[serde(rename = "baseline_window_ms", with = "millis")]
    pub baseline_window: Duration,

    pub track: TrackConfig,

    pub balance: SpeedBalance,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            roster_size: 8,
            evaluation_interval_min: Duration::from_secs(4),
            evaluation_interval_max: Duration::from_secs(10),
            restart_delay: Duration::from_secs(30),
            tie_tolerance: Duration::from_millis(100),
            race_over_remaining: 1,
            recent_window: Duration::from_secs(5 * 60),
            baseline_window: Duration::from_secs(30 * 60),
            track: TrackConfig::default(),
            balance: SpeedBalance::default(),
        }
    }
}

impl RaceConfig {
    /// Parses and validates a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, RaceError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RaceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RaceError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks ranges and orderings the controller relies on.
    pub fn validate(&self) -> Result<(), RaceError> {
        if self.roster_size < 2 {
            return Err(RaceError::invalid("roster_size must be at least 2"));
        }
        if self.race_over_remaining >= self.roster_size {
            return Err(RaceError::invalid(
                "race_over_remaining must be smaller than roster_size",
            ));
        }
        if self.evaluation_interval_min > self.evaluation_interval_max {
            return Err(RaceError::invalid("evaluation interval min exceeds max"));
        }
        if self.recent_window.is_zero() {
            return Err(RaceError::invalid("recent_window must be positive"));
        }
        if self.recent_window >= self.baseline_window {
            return Err(RaceError::invalid(
                "recent_window must be shorter than baseline_window",
            ));
        }

        let track = &self.track;
        if !(track.finish_line.is_finite() && track.finish_line > 0.0) {
            return Err(RaceError::invalid("finish_line must be positive"));
        }
        if !(track.distance_per_speed.is_finite() && track.distance_per_speed > 0.0) {
            return Err(RaceError::invalid("distance_per_speed must be positive"));
        }
        if !(track.speed_smoothing > 0.0 && track.speed_smoothing <= 1.0) {
            return Err(RaceError::invalid("speed_smoothing must be in (0, 1]"));
        }

        let mods = &track.modifiers;
        for (name, p) in [
            ("activation_chance", mods.activation_chance),
            ("boost_chance", mods.boost_chance),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(RaceError::invalid(format!("{} must be in [0, 1]", name)));
            }
        }
        if mods.check_interval_min > mods.check_interval_max
            || mods.boost_min > mods.boost_max
            || mods.boost_duration_min > mods.boost_duration_max
            || mods.slowdown_min > mods.slowdown_max
            || mods.slowdown_duration_min > mods.slowdown_duration_max
        {
            return Err(RaceError::invalid("modifier ranges must have min <= max"));
        }
        if mods.check_interval_min.is_zero() {
            return Err(RaceError::invalid("modifier check interval must be positive"));
        }

        let b = &self.balance;
        if !(b.chaos_min > 0.0 && b.chaos_min <= b.chaos_max) {
            return Err(RaceError::invalid("chaos range must satisfy 0 < min <= max"));
        }
        if !(b.luck_min >= 0.0 && b.luck_min <= b.luck_max) {
            return Err(RaceError::invalid("luck range must satisfy 0 <= min <= max"));
        }
        if !(b.max_speed.is_finite() && b.max_speed > 0.0) {
            return Err(RaceError::invalid("max_speed must be positive"));
        }
        if !(b.karma_divisor.is_finite() && b.karma_divisor > 0.0) {
            return Err(RaceError::invalid("karma_divisor must be positive"));
        }
        if b.base_speed < 0.0 {
            return Err(RaceError::invalid("base_speed must be non-negative"));
        }

        Ok(())
    }
}

/// Serializes a `Duration` as whole milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
