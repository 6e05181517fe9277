//! BotRace Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the race core run
//! unchanged against **Production** (tokio, live activity feed) and
//! **Simulation** (virtual clock, synthetic feed) environments.
//!
//! # Core Concept: The Reactor Pattern
//!
//! Everything non-deterministic the race core touches is intercepted:
//! - Time (`now()`, `sleep()`)
//! - Randomness (`RandomSource::next_f64()`)
//! - External data (`ActivitySource::fetch_agents()`, `fetch_activity()`)
//!
//! Swapping these for fakes turns every chaotic part of a race (speed
//! variance, boosts, evaluation cadence) into a reproducible sequence.
//!
//! # Example
//!
//! ```ignore
//! use botrace_env::{RaceContext, ActivitySource};
//!
//! async fn race_loop<Ctx: RaceContext, Src: ActivitySource>(ctx: &Ctx, source: &Src) {
//!     loop {
//!         ctx.sleep(Duration::from_millis(16)).await;
//!         controller.tick(ctx.now(), Duration::from_millis(16));
//!     }
//! }
//! ```

mod context;
mod random;
mod source;
mod types;
mod error;
mod tokio_impl;

pub use context::RaceContext;
pub use random::{RandomSource, EntropyRandom, SequenceRandom};
pub use source::{ActivitySource, mock_roster};
pub use types::{AgentId, Agent, PostSummary, Post, Comment, ActivitySnapshot};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
