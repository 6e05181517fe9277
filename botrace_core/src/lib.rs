//! BotRace Core - Activity-Driven Race Simulation
//!
//! Agents race along a track at speeds derived from their recent public
//! activity. This library holds the three pieces of the simulation:
//! 1. **Speed Derivation**: activity snapshots plus reputation to a bounded speed
//! 2. **Competitor Track State**: smoothed motion, temporary boosts and slowdowns
//! 3. **Race Lifecycle**: loading, racing, tie-aware results and auto-restart
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    RaceController                        │
//! │   tick(now, dt) ──► Competitor::advance (per lane)       │
//! │   poll_evaluation(now) ──► EvaluationRequest             │
//! │   apply_evaluation(batch) ──► SpeedEngine::derive        │
//! └──────────────────────────────────────────────────────────┘
//!                │                          ▲
//!                ▼                          │
//!        collect_activity(ActivitySource) ──┘
//! ```
//!
//! Time and randomness are injected: the controller takes `now` on every
//! call and draws from a [`botrace_env::RandomSource`], so the same core
//! runs against the wall clock or a simulated one.

pub mod competitor;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod race;
pub mod speed;

// Re-export key types for convenience
pub use competitor::{Competitor, ModifierConfig, ModifierKind, SpeedModifier, TrackConfig};
pub use config::RaceConfig;
pub use error::{RaceError, SpeedError};
pub use evaluation::{
    collect_activity, load_roster, ActivityReport, EvaluationBatch, EvaluationRequest,
    EvaluationSummary, EvaluationTarget,
};
pub use race::{
    determine_winners, CompetitorView, LeaderboardEntry, RaceController, RaceEvent, RacePhase,
    RaceResults, WinnerSummary,
};
pub use speed::{SpeedBalance, SpeedBreakdown, SpeedEngine};
