//! Scenario runner - executes race scenarios on a virtual clock.

use crate::context::SimContext;
use crate::driver::{DriverStats, RaceDriver};
use crate::exporter::{FrameEvent, RaceExport, RaceFrame};
use crate::feed::SyntheticFeed;
use crate::scenarios::ScenarioId;

use botrace_core::{RaceConfig, RaceResults};
use botrace_env::{mock_roster, ActivitySource, RaceContext};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Synthetic agents generated per roster slot, so each race fields a fresh subset.
const POOL_FACTOR: usize = 4;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Races that reached race-over
    pub races_completed: usize,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Results of every completed race
    pub races: Vec<RaceResults>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Evaluation passes whose batch was applied
    pub evaluations_applied: u64,

    /// Per-competitor derivations that failed
    pub derivation_failures: u64,

    /// Batches dropped because their race had ended
    pub batches_discarded: u64,

    /// Competitors that crossed the line
    pub finishes: u64,

    /// Races won by more than one competitor
    pub ties: u64,
}

impl ScenarioMetrics {
    fn from_stats(stats: &DriverStats, races: &[RaceResults]) -> Self {
        Self {
            evaluations_applied: stats.batches_applied,
            derivation_failures: stats.derivation_failures,
            batches_discarded: stats.batches_discarded,
            finishes: stats.finishes,
            ties: races.iter().filter(|r| r.is_tie()).count() as u64,
        }
    }
}

/// Runs race scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    config: RaceConfig,

    /// Tick rate in Hz
    tick_rate_hz: u32,

    /// Simulated time allowed per race, restart included
    max_secs_per_race: f64,

    /// Overrides the scenario's race count
    races: Option<usize>,

    /// Write sampled frames here
    export_path: Option<String>,

    /// Export every Nth tick
    export_interval: u64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: RaceConfig::default(),
            tick_rate_hz: 60,
            max_secs_per_race: 600.0,
            races: None,
            export_path: None,
            export_interval: 6,
        }
    }

    /// Uses the given race configuration.
    pub fn with_config(mut self, config: RaceConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    /// Sets the maximum simulated duration per race.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_secs_per_race = secs;
        self
    }

    /// Overrides the number of races.
    pub fn with_races(mut self, races: usize) -> Self {
        self.races = Some(races);
        self
    }

    /// Exports frames to a JSON file.
    pub fn with_export(mut self, path: impl Into<String>) -> Self {
        self.export_path = Some(path.into());
        self
    }

    /// Runs a scenario on a fresh single-threaded runtime.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => return self.failed(scenario, format!("Failed to build runtime: {}", e)),
        };
        runtime.block_on(self.run_async(scenario))
    }

    /// Runs a scenario on the current runtime.
    ///
    /// Expects a current-thread runtime; fetch tasks only make progress
    /// when the driver yields.
    pub async fn run_async(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let ctx = SimContext::shared(self.seed);
        let feed_seed = self.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let races = self.races.unwrap_or_else(|| scenario.default_races());

        // The flaky feed keeps one fixed field so the broken agent races every time
        let pool_size = match scenario {
            ScenarioId::FlakyFeed => self.config.roster_size,
            _ => self.config.roster_size * POOL_FACTOR,
        };
        let feed = SyntheticFeed::new(feed_seed, pool_size);
        let mut broken = None;
        let feed = match scenario {
            ScenarioId::SingleRace | ScenarioId::Marathon => feed,
            ScenarioId::RosterOutage => feed.with_roster_outage(),
            ScenarioId::FlakyFeed => {
                let victim = feed.pool().first().map(|a| a.id.clone());
                broken = victim.clone();
                let feed = feed
                    .with_latency(Arc::clone(&ctx), Duration::from_millis(500))
                    .with_flake_rate(0.2);
                match victim {
                    Some(id) => feed.with_corrupted(id),
                    None => feed,
                }
            }
        };
        let feed = Arc::new(feed);

        let mut driver = RaceDriver::new(Arc::clone(&ctx), Arc::clone(&feed), self.config.clone())
            .with_tick_rate(self.tick_rate_hz);

        let mut export = self
            .export_path
            .as_ref()
            .map(|_| RaceExport::new(scenario.name(), self.seed));
        let export_interval = self.export_interval.max(1);

        let time_limit = Duration::from_secs_f64(self.max_secs_per_race * races as f64);
        let outcome = driver
            .run_races(races, time_limit, |driver, events| {
                let Some(export) = export.as_mut() else {
                    return;
                };
                if driver.stats().ticks % export_interval == 0 || !events.is_empty() {
                    export.add_frame(frame(driver, events));
                }
            })
            .await;

        let completed = driver.completed_races().to_vec();
        let mut failure_reason = outcome.err().map(|e| e.to_string());

        if failure_reason.is_none() {
            failure_reason = self.check_races(&completed, races);
        }
        if failure_reason.is_none() {
            failure_reason = match scenario {
                ScenarioId::RosterOutage => check_mock_roster(&completed),
                ScenarioId::FlakyFeed => {
                    check_flaky(&driver, broken.as_ref().map(|id| id.as_str()))
                }
                _ => None,
            };
        }
        let passed = failure_reason.is_none();

        if let (Some(export), Some(path)) = (export.as_mut(), self.export_path.as_ref()) {
            export.finalize(passed, completed.clone());
            match export.write_to_file(path) {
                Ok(()) => info!("Exported {} frames to {}", export.frames.len(), path),
                Err(e) => error!("Failed to write export: {:?}", e),
            }
        }

        let now = driver.context().now();
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            races_completed: completed.len(),
            total_ticks: driver.stats().ticks,
            final_time_secs: now.as_secs_f64(),
            failure_reason,
            metrics: ScenarioMetrics::from_stats(driver.stats(), &completed),
            races: completed,
        }
    }

    /// Checks the invariants every completed race must satisfy.
    fn check_races(&self, races: &[RaceResults], expected: usize) -> Option<String> {
        if races.len() != expected {
            return Some(format!("Expected {} races, completed {}", expected, races.len()));
        }

        let roster = self.config.roster_size;
        let tolerance = self.config.tie_tolerance.as_millis() as u64;

        for (i, race) in races.iter().enumerate() {
            if race.race_number != i as u64 + 1 {
                return Some(format!("Race #{} reported as #{}", i + 1, race.race_number));
            }
            if race.winners.is_empty() {
                return Some(format!("Race #{} has no winner", race.race_number));
            }

            let mut places: Vec<u32> = race
                .standings
                .iter()
                .filter(|entry| entry.finished)
                .map(|entry| entry.place)
                .collect();
            if places.len() + self.config.race_over_remaining < race.standings.len() {
                return Some(format!(
                    "Race #{} ended with only {} finishers",
                    race.race_number,
                    places.len()
                ));
            }
            places.sort_unstable();
            if places.iter().enumerate().any(|(i, p)| *p != i as u32 + 1) {
                return Some(format!(
                    "Race #{} has non-unique ranks {:?}",
                    race.race_number, places
                ));
            }
            if race.standings.len() > roster {
                return Some(format!(
                    "Race #{} has more competitors than the roster",
                    race.race_number
                ));
            }

            let first = race.winners.iter().map(|w| w.finished_at_ms).min().unwrap_or(0);
            let outside = |at: u64| at != first && at - first >= tolerance;
            if race.winners.iter().any(|w| outside(w.finished_at_ms)) {
                return Some(format!(
                    "Race #{} has a winner outside the tie window",
                    race.race_number
                ));
            }
        }
        None
    }

    fn failed(&self, scenario: ScenarioId, reason: String) -> ScenarioResult {
        error!("{}", reason);
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            races_completed: 0,
            total_ticks: 0,
            final_time_secs: 0.0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
            races: Vec::new(),
        }
    }
}

/// Builds an export frame from the driver's current state.
pub fn frame<C, S>(driver: &RaceDriver<C, S>, events: &[botrace_core::RaceEvent]) -> RaceFrame
where
    C: RaceContext,
    S: ActivitySource,
{
    let controller = driver.controller();
    let now = driver.context().now();
    RaceFrame {
        time_sec: now.as_secs_f64(),
        race_number: controller.race_number(),
        phase: controller.phase(),
        competitors: controller.live_state(),
        restart_in_secs: controller.seconds_until_restart(now),
        events: events.iter().map(FrameEvent::from).collect(),
    }
}

/// Every competitor must come from the fallback roster.
fn check_mock_roster(races: &[RaceResults]) -> Option<String> {
    let mock: HashSet<String> = mock_roster(usize::MAX).into_iter().map(|a| a.name).collect();
    races
        .iter()
        .flat_map(|race| race.standings.iter())
        .find(|entry| !mock.contains(&entry.name))
        .map(|entry| format!("{} is not on the mock roster", entry.name))
}

/// Failures must be contained: they happen, the broken agent never moves,
/// and everyone else still gets speeds.
fn check_flaky<C, S>(driver: &RaceDriver<C, S>, broken: Option<&str>) -> Option<String>
where
    C: RaceContext,
    S: ActivitySource,
{
    let stats = driver.stats();
    if stats.derivation_failures == 0 {
        return Some("No derivation failures were injected".to_string());
    }
    if stats.speeds_applied == 0 {
        return Some("No speeds were applied".to_string());
    }

    let broken = broken?;
    let moved = driver
        .completed_races()
        .iter()
        .flat_map(|race| race.standings.iter())
        .any(|entry| entry.agent_id.as_str() == broken && entry.position > 0.0);
    if moved {
        return Some("Agent with malformed activity moved".to_string());
    }
    None
}
