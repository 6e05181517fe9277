//! Competitor Track State - one agent's progress along the track.
//!
//! A competitor never jumps to a new speed. The controller only sets a
//! *target*; each tick the current speed eases toward
//! `target * modifier` and the position integrates the current speed.
//!
//! Independently of the controller's evaluation schedule, every competitor
//! periodically rolls for a temporary boost or slowdown of its own.

use crate::config::millis;
use botrace_env::{Agent, RandomSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Timing and magnitude of the self-triggered speed modifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierConfig {
    #[serde(rename = "check_interval_min_ms", with = "millis")]
    pub check_interval_min: Duration,
    #[serde(rename = "check_interval_max_ms", with = "millis")]
    pub check_interval_max: Duration,

    /// Probability that a check activates a modifier
    pub activation_chance: f64,

    /// Probability that an activated modifier is a boost (else a slowdown)
    pub boost_chance: f64,

    pub boost_min: f64,
    pub boost_max: f64,
    #[serde(rename = "boost_duration_min_ms", with = "millis")]
    pub boost_duration_min: Duration,
    #[serde(rename = "boost_duration_max_ms", with = "millis")]
    pub boost_duration_max: Duration,

    pub slowdown_min: f64,
    pub slowdown_max: f64,
    #[serde(rename = "slowdown_duration_min_ms", with = "millis")]
    pub slowdown_duration_min: Duration,
    #[serde(rename = "slowdown_duration_max_ms", with = "millis")]
    pub slowdown_duration_max: Duration,
}

impl Default for ModifierConfig {
    fn default() -> Self {
        Self {
            check_interval_min: Duration::from_secs(3),
            check_interval_max: Duration::from_secs(8),
            activation_chance: 0.4,
            boost_chance: 0.5,
            boost_min: 1.7,
            boost_max: 2.0,
            boost_duration_min: Duration::from_secs(3),
            boost_duration_max: Duration::from_secs(6),
            slowdown_min: 0.4,
            slowdown_max: 0.6,
            slowdown_duration_min: Duration::from_secs(3),
            slowdown_duration_max: Duration::from_secs(5),
        }
    }
}

/// Track geometry and motion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Distance from start line to finish line
    pub finish_line: f64,

    /// Distance covered per second per unit of speed
    pub distance_per_speed: f64,

    /// Fraction of the gap to the target speed closed each tick
    pub speed_smoothing: f64,

    pub modifiers: ModifierConfig,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            finish_line: 950.0,
            distance_per_speed: 0.055,
            speed_smoothing: 0.15,
            modifiers: ModifierConfig::default(),
        }
    }
}

/// Kind of temporary speed effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    Boost,
    Slowdown,
}

/// An active speed modifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedModifier {
    pub kind: ModifierKind,
    pub multiplier: f64,
    #[serde(with = "millis")]
    pub expires_at: Duration,
}

/// Per-competitor simulation state.
#[derive(Debug, Clone)]
pub struct Competitor {
    agent: Agent,
    lane: usize,
    position: f64,
    current_speed: f64,
    target_speed: f64,
    modifier: Option<SpeedModifier>,
    next_modifier_check_at: Duration,
    finished_at: Option<Duration>,
    rank: Option<u32>,
}

impl Competitor {
    /// Creates a competitor at the start line with zero target speed.
    ///
    /// The first modifier check happens on the first tick.
    pub fn new(agent: Agent, lane: usize) -> Self {
        Self {
            agent,
            lane,
            position: 0.0,
            current_speed: 0.0,
            target_speed: 0.0,
            modifier: None,
            next_modifier_check_at: Duration::ZERO,
            finished_at: None,
            rank: None,
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn lane(&self) -> usize {
        self.lane
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn current_speed(&self) -> f64 {
        self.current_speed
    }

    /// Current speed rounded for display.
    pub fn display_speed(&self) -> u32 {
        self.current_speed.max(0.0).round() as u32
    }

    pub fn target_speed(&self) -> f64 {
        self.target_speed
    }

    pub fn modifier(&self) -> Option<&SpeedModifier> {
        self.modifier.as_ref()
    }

    pub fn modifier_kind(&self) -> Option<ModifierKind> {
        self.modifier.map(|m| m.kind)
    }

    pub fn next_modifier_check_at(&self) -> Duration {
        self.next_modifier_check_at
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn finished_at(&self) -> Option<Duration> {
        self.finished_at
    }

    pub fn rank(&self) -> Option<u32> {
        self.rank
    }

    /// Sets the speed the competitor eases toward. Ignored once finished.
    pub fn set_target_speed(&mut self, speed: f64) {
        if self.is_finished() || !speed.is_finite() {
            return;
        }
        self.target_speed = speed.max(0.0);
    }

    /// Records the finish rank. Returns false if not finished or already ranked.
    pub fn assign_rank(&mut self, rank: u32) -> bool {
        if !self.is_finished() || self.rank.is_some() {
            return false;
        }
        self.rank = Some(rank);
        true
    }

    /// Advances the competitor by one tick.
    ///
    /// Returns true if the competitor crossed the finish line during this tick.
    pub fn advance<R: RandomSource + ?Sized>(
        &mut self,
        elapsed: Duration,
        now: Duration,
        track: &TrackConfig,
        rng: &mut R,
    ) -> bool {
        if self.is_finished() {
            return false;
        }

        if now >= self.next_modifier_check_at {
            let mods = &track.modifiers;
            self.next_modifier_check_at =
                now + rng.duration_between(mods.check_interval_min, mods.check_interval_max);
            self.roll_modifier(now, mods, rng);
        }

        if let Some(modifier) = self.modifier {
            if now > modifier.expires_at {
                self.modifier = None;
            }
        }

        let multiplier = self.modifier.map(|m| m.multiplier).unwrap_or(1.0);
        let goal = self.target_speed * multiplier;
        self.current_speed += (goal - self.current_speed) * track.speed_smoothing;

        self.position += self.current_speed * track.distance_per_speed * elapsed.as_secs_f64();

        if self.position >= track.finish_line {
            self.finished_at = Some(now);
            self.current_speed = 0.0;
            self.target_speed = 0.0;
            self.modifier = None;
            return true;
        }
        false
    }

    fn roll_modifier<R: RandomSource + ?Sized>(
        &mut self,
        now: Duration,
        mods: &ModifierConfig,
        rng: &mut R,
    ) {
        if !rng.chance(mods.activation_chance) {
            return;
        }

        let modifier = if rng.chance(mods.boost_chance) {
            SpeedModifier {
                kind: ModifierKind::Boost,
                multiplier: rng.range(mods.boost_min, mods.boost_max),
                expires_at: now
                    + rng.duration_between(mods.boost_duration_min, mods.boost_duration_max),
            }
        } else {
            SpeedModifier {
                kind: ModifierKind::Slowdown,
                multiplier: rng.range(mods.slowdown_min, mods.slowdown_max),
                expires_at: now
                    + rng.duration_between(mods.slowdown_duration_min, mods.slowdown_duration_max),
            }
        };

        debug!(
            "{} {:?} x{:.2} until {}ms",
            self.agent.name,
            modifier.kind,
            modifier.multiplier,
            modifier.expires_at.as_millis()
        );
        self.modifier = Some(modifier);
    }
}
