//! Race Lifecycle Controller - owns the competitors and the race clock.
//!
//! # State Machine
//!
//! ```text
//!            prepare_race()              first apply_evaluation()
//!  Loading ──────────────► Loading* ───────────────────────────► Racing
//!     ▲                                                             │
//!     │ restart delay elapsed                 finished >= total - 1 │
//!     └────────────────────────── Finished ◄────────────────────────┘
//! ```
//!
//! The controller never sleeps or fetches by itself. A driver calls
//! [`RaceController::tick`] at a fixed rate with the current time and asks
//! [`RaceController::poll_evaluation`] whether an evaluation pass is due; the
//! pass's activity is collected elsewhere (see [`crate::evaluation`]) and
//! handed back through [`RaceController::apply_evaluation`].

use crate::competitor::{Competitor, ModifierKind};
use crate::config::RaceConfig;
use crate::evaluation::{
    collect_activity, load_roster, EvaluationBatch, EvaluationRequest, EvaluationSummary,
    EvaluationTarget,
};
use crate::speed::SpeedEngine;
use botrace_env::{ActivitySource, Agent, AgentId, RaceContext, RandomSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle phase of the current race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RacePhase {
    /// Fetching the roster and running the first evaluation
    Loading,
    Racing,
    /// Race over, waiting for the restart delay
    Finished,
}

/// One row of the live leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Finish rank for finished competitors, running position otherwise
    pub place: u32,
    pub agent_id: AgentId,
    pub name: String,
    pub lane: usize,
    pub position: f64,
    pub finished: bool,
}

/// Live per-competitor state for visualization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorView {
    pub agent_id: AgentId,
    pub name: String,
    pub lane: usize,
    pub position: f64,
    pub speed: u32,
    pub modifier: Option<ModifierKind>,
    pub finished: bool,
    pub rank: Option<u32>,
}

/// A winner as shown on the results screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerSummary {
    pub agent_id: AgentId,
    pub name: String,
    pub karma: f64,
    pub recent_post_title: Option<String>,
    pub finished_at_ms: u64,
}

/// Snapshot taken once when a race ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResults {
    pub race_number: u64,
    pub winners: Vec<WinnerSummary>,
    pub standings: Vec<LeaderboardEntry>,
}

impl RaceResults {
    pub fn is_tie(&self) -> bool {
        self.winners.len() > 1
    }
}

/// Something observable that happened during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum RaceEvent {
    /// A competitor crossed the line and received its rank
    Finished {
        agent_id: AgentId,
        name: String,
        rank: u32,
        at: Duration,
    },
    RaceOver(RaceResults),
    /// Competitors torn down; the controller is loading this race number
    Restarted { race_number: u64 },
}

/// Returns the indices of every finisher within `tolerance` of the earliest finish.
///
/// `finishes` pairs an arbitrary index with a finish instant. A finish counts
/// as tied when it is strictly less than `tolerance` after the first one.
/// Finishes at exactly the first instant always win, even with zero tolerance.
pub fn determine_winners(finishes: &[(usize, Duration)], tolerance: Duration) -> Vec<usize> {
    let Some(first) = finishes.iter().map(|(_, at)| *at).min() else {
        return Vec::new();
    };
    finishes
        .iter()
        .filter(|(_, at)| *at == first || *at - first < tolerance)
        .map(|(index, _)| *index)
        .collect()
}

/// The race lifecycle controller.
///
/// Generic over the random source so that tests can replay fixed draws.
pub struct RaceController<R: RandomSource> {
    config: RaceConfig,
    engine: SpeedEngine,
    rng: R,

    phase: RacePhase,
    race_number: u64,
    competitors: Vec<Competitor>,

    race_started_at: Option<Duration>,
    next_evaluation_at: Option<Duration>,
    race_over_at: Option<Duration>,

    /// Rank handed to the next finisher
    next_rank: u32,

    results: Option<RaceResults>,
}

impl<R: RandomSource> RaceController<R> {
    /// Creates a controller in `Loading` for race #1.
    pub fn new(config: RaceConfig, rng: R) -> Self {
        let engine = SpeedEngine::new(config.balance.clone());
        Self {
            config,
            engine,
            rng,
            phase: RacePhase::Loading,
            race_number: 1,
            competitors: Vec::new(),
            race_started_at: None,
            next_evaluation_at: None,
            race_over_at: None,
            next_rank: 1,
            results: None,
        }
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn race_number(&self) -> u64 {
        self.race_number
    }

    pub fn competitors(&self) -> &[Competitor] {
        &self.competitors
    }

    pub fn race_started_at(&self) -> Option<Duration> {
        self.race_started_at
    }

    pub fn next_evaluation_at(&self) -> Option<Duration> {
        self.next_evaluation_at
    }

    pub fn race_over_at(&self) -> Option<Duration> {
        self.race_over_at
    }

    pub fn next_rank(&self) -> u32 {
        self.next_rank
    }

    /// Results of the current race, once it is over.
    pub fn results(&self) -> Option<&RaceResults> {
        self.results.as_ref()
    }

    pub fn finished_count(&self) -> usize {
        self.competitors.iter().filter(|c| c.is_finished()).count()
    }

    /// True once only `race_over_remaining` competitors are still running.
    pub fn is_race_over(&self) -> bool {
        !self.competitors.is_empty()
            && self.finished_count()
                >= self
                    .competitors
                    .len()
                    .saturating_sub(self.config.race_over_remaining)
    }

    /// Builds the competitors for a new race from a fetched roster.
    ///
    /// Lanes follow a full shuffle of the roster. Karma is normalized here so
    /// that every later derivation sees a finite, non-negative reputation.
    /// Returns the initial evaluation pass, which moves the race to `Racing`
    /// once applied. Returns `None` outside `Loading`.
    pub fn prepare_race(&mut self, mut agents: Vec<Agent>) -> Option<EvaluationRequest> {
        if self.phase != RacePhase::Loading {
            warn!("prepare_race called in {:?}, ignoring", self.phase);
            return None;
        }

        self.rng.shuffle(&mut agents);

        self.competitors = agents
            .into_iter()
            .enumerate()
            .map(|(lane, mut agent)| {
                agent.karma = agent.normalized_reputation();
                Competitor::new(agent, lane)
            })
            .collect();
        self.race_started_at = None;
        self.next_evaluation_at = None;
        self.race_over_at = None;
        self.next_rank = 1;
        self.results = None;

        info!(
            "Race #{}: {} competitors on the grid",
            self.race_number,
            self.competitors.len()
        );
        Some(self.evaluation_request())
    }

    /// Plans a pass over every competitor still racing.
    pub fn evaluation_request(&self) -> EvaluationRequest {
        EvaluationRequest {
            race_number: self.race_number,
            targets: self
                .competitors
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.is_finished())
                .map(|(slot, c)| EvaluationTarget {
                    slot,
                    agent: c.agent().clone(),
                })
                .collect(),
            recent_window: self.config.recent_window,
            baseline_window: self.config.baseline_window,
        }
    }

    /// Returns a pass to run if one is due, scheduling the one after it.
    pub fn poll_evaluation(&mut self, now: Duration) -> Option<EvaluationRequest> {
        if self.phase != RacePhase::Racing || self.is_race_over() {
            return None;
        }
        match self.next_evaluation_at {
            Some(due) if now >= due => {
                self.schedule_next_evaluation(now);
                Some(self.evaluation_request())
            }
            _ => None,
        }
    }

    fn schedule_next_evaluation(&mut self, now: Duration) {
        let delay = self.rng.duration_between(
            self.config.evaluation_interval_min,
            self.config.evaluation_interval_max,
        );
        self.next_evaluation_at = Some(now + delay);
        debug!(
            "Race #{}: next evaluation in {}ms",
            self.race_number,
            delay.as_millis()
        );
    }

    /// Derives and applies target speeds from a collected batch.
    ///
    /// Batches from another race, or arriving after the race is over, are
    /// dropped. A failed derivation leaves that competitor's target speed
    /// untouched and does not affect the others. The first batch of a race
    /// starts it.
    pub fn apply_evaluation(&mut self, batch: EvaluationBatch, now: Duration) -> EvaluationSummary {
        let mut summary = EvaluationSummary::default();

        if batch.race_number != self.race_number || self.phase == RacePhase::Finished {
            debug!(
                "Discarding evaluation for race #{} (current race #{}, {:?})",
                batch.race_number, self.race_number, self.phase
            );
            summary.discarded = true;
            return summary;
        }

        for report in batch.reports {
            let Some(competitor) = self.competitors.get_mut(report.slot) else {
                summary.failed += 1;
                continue;
            };
            if competitor.agent().id != report.agent_id {
                warn!("Evaluation slot {} does not match agent {}", report.slot, report.agent_id);
                summary.failed += 1;
                continue;
            }
            if competitor.is_finished() {
                summary.skipped += 1;
                continue;
            }

            match self.engine.derive(
                &report.recent,
                report.baseline.as_ref(),
                competitor.agent(),
                &mut self.rng,
            ) {
                Ok(breakdown) => {
                    competitor.set_target_speed(breakdown.final_speed);
                    summary.applied += 1;
                }
                Err(e) => {
                    warn!(
                        "Speed derivation failed for {} ({}): {}",
                        competitor.agent().name,
                        competitor.agent().id,
                        e
                    );
                    summary.failed += 1;
                }
            }
        }

        if self.phase == RacePhase::Loading && !self.competitors.is_empty() {
            self.phase = RacePhase::Racing;
            self.race_started_at = Some(now);
            self.schedule_next_evaluation(now);
            info!("Race #{}: in progress", self.race_number);
        }

        debug!(
            "Race #{}: evaluation applied={} failed={} skipped={}",
            self.race_number, summary.applied, summary.failed, summary.skipped
        );
        summary
    }

    /// Advances the race by one tick.
    pub fn tick(&mut self, now: Duration, elapsed: Duration) -> Vec<RaceEvent> {
        match self.phase {
            RacePhase::Loading => Vec::new(),
            RacePhase::Racing => self.tick_racing(now, elapsed),
            RacePhase::Finished => self.tick_finished(now),
        }
    }

    fn tick_racing(&mut self, now: Duration, elapsed: Duration) -> Vec<RaceEvent> {
        let mut events = Vec::new();

        if !self.is_race_over() {
            for competitor in &mut self.competitors {
                competitor.advance(elapsed, now, &self.config.track, &mut self.rng);
            }

            for competitor in &mut self.competitors {
                if competitor.is_finished() && competitor.rank().is_none() {
                    let rank = self.next_rank;
                    competitor.assign_rank(rank);
                    self.next_rank += 1;
                    let at = competitor.finished_at().unwrap_or(now);
                    info!(
                        "Race #{}: {} finished #{} at {}ms",
                        self.race_number,
                        competitor.agent().name,
                        rank,
                        at.as_millis()
                    );
                    events.push(RaceEvent::Finished {
                        agent_id: competitor.agent().id.clone(),
                        name: competitor.agent().name.clone(),
                        rank,
                        at,
                    });
                }
            }
        }

        if self.is_race_over() && self.race_over_at.is_none() {
            let results = self.conclude(now);
            events.push(RaceEvent::RaceOver(results));
        }
        events
    }

    /// Takes the race-over snapshot. Runs once per race.
    fn conclude(&mut self, now: Duration) -> RaceResults {
        self.race_over_at = Some(now);
        self.phase = RacePhase::Finished;

        let finishes: Vec<(usize, Duration)> = self
            .competitors
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.finished_at().map(|at| (i, at)))
            .collect();

        let winners: Vec<WinnerSummary> = determine_winners(&finishes, self.config.tie_tolerance)
            .into_iter()
            .map(|i| {
                let c = &self.competitors[i];
                WinnerSummary {
                    agent_id: c.agent().id.clone(),
                    name: c.agent().name.clone(),
                    karma: c.agent().karma,
                    recent_post_title: c.agent().recent_post.as_ref().map(|p| p.title.clone()),
                    finished_at_ms: c.finished_at().unwrap_or(now).as_millis() as u64,
                }
            })
            .collect();

        let results = RaceResults {
            race_number: self.race_number,
            winners,
            standings: self.leaderboard(),
        };

        let names: Vec<&str> = results.winners.iter().map(|w| w.name.as_str()).collect();
        if results.is_tie() {
            info!("Race #{} complete: TIE between {}", self.race_number, names.join(", "));
        } else {
            info!("Race #{} complete: winner {}", self.race_number, names.join(", "));
        }

        self.results = Some(results.clone());
        results
    }

    fn tick_finished(&mut self, now: Duration) -> Vec<RaceEvent> {
        if self.remaining_restart_delay(now) != Some(Duration::ZERO) {
            return Vec::new();
        }

        self.competitors.clear();
        self.race_number += 1;
        self.phase = RacePhase::Loading;
        self.race_started_at = None;
        self.next_evaluation_at = None;
        self.race_over_at = None;
        self.next_rank = 1;
        self.results = None;

        info!("Restarting: loading race #{}", self.race_number);
        vec![RaceEvent::Restarted {
            race_number: self.race_number,
        }]
    }

    /// Time left before the next race starts loading, while `Finished`.
    pub fn remaining_restart_delay(&self, now: Duration) -> Option<Duration> {
        let over_at = self.race_over_at?;
        if self.phase != RacePhase::Finished {
            return None;
        }
        let since = now.saturating_sub(over_at);
        Some(self.config.restart_delay.saturating_sub(since))
    }

    /// Whole seconds left on the restart countdown, rounded up.
    pub fn seconds_until_restart(&self, now: Duration) -> Option<u64> {
        self.remaining_restart_delay(now)
            .map(|left| (left.as_millis() as u64).div_ceil(1000))
    }

    /// Finished competitors by rank, then running ones by distance covered.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut finished: Vec<&Competitor> =
            self.competitors.iter().filter(|c| c.is_finished()).collect();
        finished.sort_by_key(|c| c.rank().unwrap_or(u32::MAX));

        let mut running: Vec<&Competitor> =
            self.competitors.iter().filter(|c| !c.is_finished()).collect();
        running.sort_by(|a, b| b.position().total_cmp(&a.position()));

        let finished_count = finished.len() as u32;
        let entry = |c: &Competitor, place: u32| LeaderboardEntry {
            place,
            agent_id: c.agent().id.clone(),
            name: c.agent().name.clone(),
            lane: c.lane(),
            position: c.position(),
            finished: c.is_finished(),
        };

        finished
            .iter()
            .enumerate()
            .map(|(i, c)| entry(*c, c.rank().unwrap_or(i as u32 + 1)))
            .chain(
                running
                    .iter()
                    .enumerate()
                    .map(|(i, c)| entry(*c, finished_count + i as u32 + 1)),
            )
            .collect()
    }

    /// Live state of every competitor, in lane order.
    pub fn live_state(&self) -> Vec<CompetitorView> {
        self.competitors
            .iter()
            .map(|c| CompetitorView {
                agent_id: c.agent().id.clone(),
                name: c.agent().name.clone(),
                lane: c.lane(),
                position: c.position(),
                speed: c.display_speed(),
                modifier: c.modifier_kind(),
                finished: c.is_finished(),
                rank: c.rank(),
            })
            .collect()
    }

    /// Loads a roster and runs the initial evaluation pass in one step.
    ///
    /// Falls back to the mock roster if the source cannot supply agents.
    pub async fn initialize<S, C>(&mut self, source: &S, ctx: &C) -> EvaluationSummary
    where
        S: ActivitySource + ?Sized,
        C: RaceContext,
    {
        let agents = load_roster(source, self.config.roster_size).await;
        let Some(request) = self.prepare_race(agents) else {
            return EvaluationSummary {
                discarded: true,
                ..EvaluationSummary::default()
            };
        };
        let batch = collect_activity(source, request).await;
        self.apply_evaluation(batch, ctx.now())
    }

    /// Runs a due evaluation pass to completion, if one is due.
    pub async fn run_due_evaluation<S, C>(
        &mut self,
        source: &S,
        ctx: &C,
    ) -> Option<EvaluationSummary>
    where
        S: ActivitySource + ?Sized,
        C: RaceContext,
    {
        let request = self.poll_evaluation(ctx.now())?;
        let batch = collect_activity(source, request).await;
        Some(self.apply_evaluation(batch, ctx.now()))
    }
}
