//! Core environment context trait for the race loop.

use async_trait::async_trait;
use crate::random::RandomSource;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" clock so that the race controller
/// can be driven by a wall clock in production and by a virtual clock in
/// simulation.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, OS entropy
/// - **Simulation**: `SimContext` - manually advanced clock, `ChaCha8Rng(seed)`
#[async_trait]
pub trait RaceContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Every race instant (finish times, evaluation schedule, modifier
    /// expiry) is expressed on this timeline.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time, used only for display and export.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Creates an independent random stream for one consumer.
    ///
    /// `stream` distinguishes consumers (the controller, the feed, ...) so
    /// that adding draws to one does not perturb the others.
    fn random_source(&self, stream: u64) -> Box<dyn RandomSource>;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
