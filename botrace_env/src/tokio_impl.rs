//! Production implementation of RaceContext using Tokio.

use crate::random::{EntropyRandom, RandomSource};
use crate::RaceContext;
use async_trait::async_trait;
use std::time::{Duration, Instant, SystemTime};

/// Production context backed by Tokio and OS entropy.
///
/// Time comes from the system clock, randomness from `StdRng::from_entropy`.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RaceContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::trace!("spawning task {}", name);
        tokio::spawn(future);
    }

    fn random_source(&self, _stream: u64) -> Box<dyn RandomSource> {
        // Production streams are independent by virtue of OS entropy
        Box::new(EntropyRandom::new())
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}
