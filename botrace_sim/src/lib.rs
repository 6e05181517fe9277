//! BotRace Simulation Harness
//!
//! Runs the race core end to end without a wall clock or a live platform:
//! - **Time**: virtual clock, advanced one tick at a time by the driver
//! - **Activity**: synthetic feed with injectable outages and bad data
//! - **Randomness**: every stream derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ScenarioRunner                        │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ RaceDriver (tick loop)                               │   │
//! │  │   RaceController ◄── batches ── evaluation tasks     │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │        │ now()                          │ fetch_*()         │
//! │  ┌─────▼──────┐                  ┌──────▼────────┐          │
//! │  │ SimContext │                  │ SyntheticFeed │          │
//! │  └────────────┘                  └───────────────┘          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use botrace_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::SingleRace);
//! assert!(result.passed);
//! ```

mod context;
mod driver;
mod exporter;
mod feed;
mod runner;
pub mod scenarios;

pub use context::{ChaChaRandom, SimContext};
pub use driver::{DriverError, DriverStats, RaceDriver, CONTROLLER_STREAM};
pub use exporter::{FrameEvent, RaceExport, RaceFrame};
pub use feed::{FeedConfig, SyntheticFeed};
pub use runner::{frame, ScenarioMetrics, ScenarioResult, ScenarioRunner};
