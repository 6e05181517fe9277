//! End-to-end races on the virtual clock.

use async_trait::async_trait;
use botrace_core::{RaceConfig, RaceEvent, RacePhase};
use botrace_env::{ActivitySnapshot, ActivitySource, Agent, EnvError, RaceContext};
use botrace_sim::scenarios::ScenarioId;
use botrace_sim::{RaceDriver, ScenarioRunner, SimContext, SyntheticFeed};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// Eight silent agents with no reputation.
struct SilentSource;

#[async_trait]
impl ActivitySource for SilentSource {
    async fn fetch_agents(&self, count: usize) -> Result<Vec<Agent>, EnvError> {
        Ok((0..count)
            .map(|i| Agent::new(format!("silent-{}", i), format!("Silent{}", i), 0.0))
            .collect())
    }

    async fn fetch_activity(&self, _agent: &Agent, window: Duration) -> ActivitySnapshot {
        ActivitySnapshot::empty(window)
    }
}

#[tokio::test]
async fn silent_roster_gets_base_speed_band() {
    let ctx = SimContext::shared(5);
    let mut driver = RaceDriver::new(ctx, Arc::new(SilentSource), RaceConfig::default());

    while driver.controller().phase() == RacePhase::Loading {
        driver.step().await;
    }

    let balance = &driver.controller().config().balance;
    let low = (balance.base_speed * balance.chaos_min + balance.luck_min).round();
    let high = (balance.base_speed * balance.chaos_max + balance.luck_max)
        .min(balance.max_speed)
        .round();

    assert_eq!(driver.controller().competitors().len(), 8);
    for competitor in driver.controller().competitors() {
        let target = competitor.target_speed();
        assert!(target >= low && target <= high, "target {} outside [{}, {}]", target, low, high);
        assert_eq!(target, target.round());
    }
}

#[tokio::test]
async fn restart_follows_race_over_by_delay() {
    let ctx = SimContext::shared(21);
    let feed = Arc::new(SyntheticFeed::new(21, 8));
    let mut driver = RaceDriver::new(Arc::clone(&ctx), feed, RaceConfig::default());
    let restart_delay = driver.controller().config().restart_delay;

    let mut over_at = None;
    let mut restarted_at = None;
    let mut last_countdown = None;

    while restarted_at.is_none() && ctx.now() < Duration::from_secs(900) {
        let events = driver.step().await;
        let now = ctx.now();
        for event in &events {
            match event {
                RaceEvent::RaceOver(results) => {
                    assert_eq!(results.race_number, 1);
                    over_at = driver.controller().race_over_at();
                }
                RaceEvent::Restarted { race_number } => {
                    assert_eq!(*race_number, 2);
                    restarted_at = Some(now);
                }
                RaceEvent::Finished { .. } => {}
            }
        }
        if driver.controller().phase() == RacePhase::Finished {
            last_countdown = driver.controller().seconds_until_restart(now);
        }
    }

    let over_at = over_at.expect("race never ended");
    let restarted_at = restarted_at.expect("race never restarted");
    let waited = restarted_at - over_at;

    assert!(waited >= restart_delay);
    assert!(waited < restart_delay + driver.tick_duration());
    assert_eq!(last_countdown, Some(1));
    assert_eq!(driver.controller().phase(), RacePhase::Loading);
    assert!(driver.controller().competitors().is_empty());
}

#[tokio::test]
async fn slow_fetches_from_finished_race_are_dropped() {
    let ctx = SimContext::shared(8);
    // Slower than the longest evaluation interval: a pass is always in flight
    let feed = Arc::new(
        SyntheticFeed::new(8, 8).with_latency(Arc::clone(&ctx), Duration::from_secs(20)),
    );
    let mut driver = RaceDriver::new(Arc::clone(&ctx), feed, RaceConfig::default());

    driver
        .run_races(1, Duration::from_secs(1200), |_, _| {})
        .await
        .unwrap();

    assert!(driver.stats().batches_discarded >= 1);
    assert_eq!(driver.completed_races().len(), 1);
    assert_eq!(driver.controller().race_number(), 2);
}

#[test]
fn marathon_numbers_races_consecutively() {
    let result = ScenarioRunner::new(77).run(ScenarioId::Marathon);
    assert!(result.passed, "marathon failed: {:?}", result.failure_reason);

    let numbers: Vec<u64> = result.races.iter().map(|r| r.race_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    for race in &result.races {
        let first = race.standings.first().unwrap();
        assert_eq!(first.place, 1);
        assert!(first.finished);
    }

    let fields: Vec<Vec<String>> = result
        .races
        .iter()
        .map(|race| {
            let mut ids: Vec<String> =
                race.standings.iter().map(|e| e.agent_id.as_str().to_string()).collect();
            ids.sort();
            ids
        })
        .collect();
    assert!(fields.windows(2).any(|pair| pair[0] != pair[1]));
}

#[test]
fn every_scenario_passes_for_default_seed() {
    for scenario in ScenarioId::all() {
        let result = ScenarioRunner::new(42).run(scenario);
        assert!(result.passed, "{} failed: {:?}", scenario, result.failure_reason);
    }
}

#[test]
fn export_writes_frames() {
    let path = std::env::temp_dir().join(format!("botrace_export_{}.json", std::process::id()));
    let path_str = path.to_string_lossy().to_string();

    let result = ScenarioRunner::new(4).with_export(path_str.clone()).run(ScenarioId::SingleRace);
    assert!(result.passed);

    let text = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["scenario"], "single_race");
    assert_eq!(json["seed"], 4);
    assert!(json["frames"].as_array().unwrap().len() > 10);
    assert_eq!(json["races"].as_array().unwrap().len(), 1);

    let _ = std::fs::remove_file(&path);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn single_race_holds_invariants_for_any_seed(seed in 1u64..u64::MAX) {
        let result = ScenarioRunner::new(seed).run(ScenarioId::SingleRace);
        prop_assert!(result.passed, "seed {} failed: {:?}", seed, result.failure_reason);
    }
}
