//! Simulation context implementing RaceContext on a virtual clock.

use async_trait::async_trait;
use botrace_env::{RaceContext, RandomSource};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Mixes a stream id into the master seed.
const STREAM_MIX: u64 = 0x517cc1b727220a95;

/// Simulation context backed by a virtual clock and seeded randomness.
///
/// This implements `RaceContext` using:
/// - A virtual clock that only moves when advanced (or slept on)
/// - Per-stream `ChaCha8Rng` sources derived from one master seed
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<AtomicU64>,

    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: SystemTime,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        self.virtual_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        self.virtual_time_ns.store(time_ns, Ordering::SeqCst);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }

    /// Yields to the runtime until virtual time reaches `deadline`.
    ///
    /// Unlike `sleep`, this does not move the clock; some other task must.
    pub async fn wait_until(&self, deadline: Duration) {
        while self.now() < deadline {
            tokio::task::yield_now().await;
        }
    }

    /// Seeded generator for one stream, for callers that want `rand` directly.
    pub fn stream_rng(&self, stream: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed.wrapping_mul(STREAM_MIX) ^ stream)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl RaceContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        // In simulation, sleep advances virtual time
        self.advance_time(duration);
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::trace!("spawning sim task {}", name);
        tokio::spawn(future);
    }

    fn random_source(&self, stream: u64) -> Box<dyn RandomSource> {
        Box::new(ChaChaRandom::new(self.stream_rng(stream)))
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

/// `RandomSource` over a seeded ChaCha8 generator.
pub struct ChaChaRandom {
    rng: ChaCha8Rng,
}

impl ChaChaRandom {
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self { rng }
    }
}

impl RandomSource for ChaChaRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}
