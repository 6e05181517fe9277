//! Race driver - runs a `RaceController` against a context and activity source.
//!
//! # Tick Loop
//!
//! ```text
//!  ┌──► ctx.sleep(tick) ──► yield (let fetch tasks run)
//!  │          │
//!  │    drain finished batches ──► controller.apply_evaluation()
//!  │          │
//!  │    controller.poll_evaluation() ──► spawn collect_activity task ──┐
//!  │          │                                                        │
//!  │    controller.tick(now, dt)                          mpsc channel │
//!  └──────────┘ ◄──────────────────────────────────────────────────────┘
//! ```
//!
//! Fetches run as spawned tasks and report back through a channel, so a
//! slow activity source never stalls the race. Batches that arrive after
//! the race they were planned for has ended are dropped by the controller.

use botrace_core::{
    collect_activity, load_roster, EvaluationBatch, EvaluationRequest, RaceConfig,
    RaceController, RaceEvent, RacePhase, RaceResults,
};
use botrace_env::{ActivitySource, RaceContext, RandomSource};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// Random stream used by the controller.
pub const CONTROLLER_STREAM: u64 = 1;

/// Errors from driving a race.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Time limit of {limit_secs:.0}s reached after {races} completed races")]
    TimeLimit { limit_secs: f64, races: usize },
}

/// Counters collected while driving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub ticks: u64,
    pub roster_loads: u64,
    pub passes_dispatched: u64,
    pub batches_applied: u64,
    pub batches_discarded: u64,
    pub speeds_applied: u64,
    pub derivation_failures: u64,
    pub finishes: u64,
    pub restarts: u64,
}

/// Drives one controller through consecutive races.
pub struct RaceDriver<C: RaceContext, S: ActivitySource> {
    ctx: Arc<C>,
    source: Arc<S>,
    controller: RaceController<Box<dyn RandomSource>>,

    /// Simulated time per tick
    tick: Duration,

    batches_tx: UnboundedSender<EvaluationBatch>,
    batches_rx: UnboundedReceiver<EvaluationBatch>,
    in_flight: usize,

    /// Set when the controller is waiting for a roster
    needs_roster: bool,

    completed: Vec<RaceResults>,
    stats: DriverStats,
}

impl<C: RaceContext, S: ActivitySource> RaceDriver<C, S> {
    /// Creates a driver ticking at 60 Hz.
    pub fn new(ctx: Arc<C>, source: Arc<S>, config: RaceConfig) -> Self {
        let rng = ctx.random_source(CONTROLLER_STREAM);
        let (batches_tx, batches_rx) = unbounded_channel();
        Self {
            ctx,
            source,
            controller: RaceController::new(config, rng),
            tick: Duration::from_secs_f64(1.0 / 60.0),
            batches_tx,
            batches_rx,
            in_flight: 0,
            needs_roster: true,
            completed: Vec::new(),
            stats: DriverStats::default(),
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick = Duration::from_secs_f64(1.0 / hz.max(1) as f64);
        self
    }

    pub fn controller(&self) -> &RaceController<Box<dyn RandomSource>> {
        &self.controller
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Results of every race that has ended so far.
    pub fn completed_races(&self) -> &[RaceResults] {
        &self.completed
    }

    /// Evaluation passes dispatched but not yet drained.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Runs one driver iteration and returns the tick's events.
    pub async fn step(&mut self) -> Vec<RaceEvent> {
        if self.needs_roster && self.controller.phase() == RacePhase::Loading {
            self.begin_race().await;
        }

        self.ctx.sleep(self.tick).await;
        tokio::task::yield_now().await;
        let now = self.ctx.now();

        self.drain_batches(now);

        if let Some(request) = self.controller.poll_evaluation(now) {
            self.dispatch(request);
        }

        let events = self.controller.tick(now, self.tick);
        self.stats.ticks += 1;

        for event in &events {
            match event {
                RaceEvent::Finished { .. } => self.stats.finishes += 1,
                RaceEvent::RaceOver(results) => self.completed.push(results.clone()),
                RaceEvent::Restarted { .. } => {
                    self.stats.restarts += 1;
                    self.needs_roster = true;
                }
            }
        }
        events
    }

    /// Runs until `races` races have ended and the controller has restarted
    /// after the last one, calling `observer` after every tick.
    pub async fn run_races<F>(
        &mut self,
        races: usize,
        time_limit: Duration,
        mut observer: F,
    ) -> Result<(), DriverError>
    where
        F: FnMut(&Self, &[RaceEvent]),
    {
        let started = self.ctx.now();
        while (self.stats.restarts as usize) < races {
            if self.ctx.now() - started >= time_limit {
                return Err(DriverError::TimeLimit {
                    limit_secs: time_limit.as_secs_f64(),
                    races: self.completed.len(),
                });
            }
            let events = self.step().await;
            observer(self, &events);
        }
        Ok(())
    }

    async fn begin_race(&mut self) {
        let roster_size = self.controller.config().roster_size;
        let agents = load_roster(&*self.source, roster_size).await;
        self.stats.roster_loads += 1;
        self.needs_roster = false;

        if let Some(request) = self.controller.prepare_race(agents) {
            self.dispatch(request);
        }
    }

    fn dispatch(&mut self, request: EvaluationRequest) {
        let source = Arc::clone(&self.source);
        let tx = self.batches_tx.clone();
        let race_number = request.race_number;

        self.ctx.spawn("evaluation", async move {
            let batch = collect_activity(&*source, request).await;
            // Receiver only goes away with the driver
            let _ = tx.send(batch);
        });

        self.in_flight += 1;
        self.stats.passes_dispatched += 1;
        debug!("Race #{}: evaluation pass dispatched", race_number);
    }

    fn drain_batches(&mut self, now: Duration) {
        while let Ok(batch) = self.batches_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            let summary = self.controller.apply_evaluation(batch, now);

            if summary.discarded {
                self.stats.batches_discarded += 1;
                info!("Dropped an evaluation from an earlier race");
            } else {
                self.stats.batches_applied += 1;
                self.stats.speeds_applied += summary.applied as u64;
                self.stats.derivation_failures += summary.failed as u64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use crate::feed::SyntheticFeed;

    fn driver(seed: u64) -> RaceDriver<SimContext, SyntheticFeed> {
        let ctx = SimContext::shared(seed);
        let feed = Arc::new(SyntheticFeed::new(seed, 8));
        RaceDriver::new(ctx, feed, RaceConfig::default())
    }

    #[tokio::test]
    async fn test_first_step_loads_roster_and_dispatches() {
        let mut driver = driver(42);
        assert_eq!(driver.controller().phase(), RacePhase::Loading);

        driver.step().await;

        assert_eq!(driver.stats().roster_loads, 1);
        assert_eq!(driver.stats().passes_dispatched, 1);
        assert_eq!(driver.controller().competitors().len(), 8);
    }

    #[tokio::test]
    async fn test_initial_pass_starts_race() {
        let mut driver = driver(42);
        for _ in 0..5 {
            driver.step().await;
        }

        assert_eq!(driver.controller().phase(), RacePhase::Racing);
        assert_eq!(driver.in_flight(), 0);
        assert_eq!(driver.stats().batches_applied, 1);
        assert_eq!(driver.stats().speeds_applied, 8);
        assert!(driver
            .controller()
            .competitors()
            .iter()
            .all(|c| c.target_speed() > 0.0));
    }

    #[tokio::test]
    async fn test_run_single_race_to_restart() {
        let mut driver = driver(7);
        let mut race_overs = 0;
        driver
            .run_races(1, Duration::from_secs(900), |_, events| {
                race_overs += events
                    .iter()
                    .filter(|e| matches!(e, RaceEvent::RaceOver(_)))
                    .count();
            })
            .await
            .unwrap();

        assert_eq!(race_overs, 1);
        assert_eq!(driver.completed_races().len(), 1);
        assert_eq!(driver.controller().race_number(), 2);
        assert_eq!(driver.controller().phase(), RacePhase::Loading);
        assert!(driver.stats().finishes >= 7);
    }

    #[tokio::test]
    async fn test_time_limit() {
        let mut driver = driver(7);
        let err = driver
            .run_races(1, Duration::from_secs(5), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::TimeLimit { races: 0, .. }));
    }
}
