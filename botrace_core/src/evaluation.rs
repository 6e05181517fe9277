//! Activity collection for evaluation passes.
//!
//! Fetching is the only place the race waits on the outside world, so it is
//! kept apart from the controller: a pass is planned by the controller as an
//! [`EvaluationRequest`], the fetches run without touching race state, and
//! the resulting [`EvaluationBatch`] is handed back to the controller, which
//! drops it if the race it was planned for is already over.
//!
//! ```text
//! controller.poll_evaluation(now) ──► EvaluationRequest { race_number, agents }
//!                                           │
//!                        collect_activity(source, request)   (async, concurrent)
//!                                           │
//! controller.apply_evaluation(batch) ◄── EvaluationBatch { race_number, reports }
//! ```

use botrace_env::{ActivitySnapshot, ActivitySource, Agent, AgentId};
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, warn};

/// One competitor to evaluate.
#[derive(Debug, Clone)]
pub struct EvaluationTarget {
    /// Index of the competitor in the race
    pub slot: usize,
    pub agent: Agent,
}

/// A planned evaluation pass, tagged with the race it belongs to.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub race_number: u64,
    pub targets: Vec<EvaluationTarget>,
    pub recent_window: Duration,
    pub baseline_window: Duration,
}

impl EvaluationRequest {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Activity fetched for one competitor.
#[derive(Debug, Clone)]
pub struct ActivityReport {
    pub slot: usize,
    pub agent_id: AgentId,
    pub recent: ActivitySnapshot,
    pub baseline: Option<ActivitySnapshot>,
}

/// All activity fetched for one pass.
#[derive(Debug, Clone)]
pub struct EvaluationBatch {
    pub race_number: u64,
    pub reports: Vec<ActivityReport>,
}

/// Outcome of applying a batch to the race.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    /// Competitors whose target speed was updated
    pub applied: usize,

    /// Competitors whose derivation failed and kept their previous target
    pub failed: usize,

    /// Competitors skipped because they had already finished
    pub skipped: usize,

    /// The batch belonged to another race (or a finished one) and was dropped
    pub discarded: bool,
}

/// Fetches recent and baseline activity for every target concurrently.
///
/// Both windows of one agent are fetched together; agents complete in any
/// order. The call returns once every fetch has settled.
pub async fn collect_activity<S>(source: &S, request: EvaluationRequest) -> EvaluationBatch
where
    S: ActivitySource + ?Sized,
{
    let EvaluationRequest {
        race_number,
        targets,
        recent_window,
        baseline_window,
    } = request;

    let fetches = targets.into_iter().map(|target| async move {
        let (recent, baseline) = futures::join!(
            source.fetch_activity(&target.agent, recent_window),
            source.fetch_activity(&target.agent, baseline_window),
        );
        ActivityReport {
            slot: target.slot,
            agent_id: target.agent.id,
            recent,
            baseline: Some(baseline),
        }
    });

    let reports = join_all(fetches).await;
    debug!("Race #{}: collected activity for {} competitors", race_number, reports.len());

    EvaluationBatch {
        race_number,
        reports,
    }
}

/// Fetches a roster, falling back to the source's mock roster on failure.
///
/// An empty roster counts as a failure. The result never exceeds `count`.
pub async fn load_roster<S>(source: &S, count: usize) -> Vec<Agent>
where
    S: ActivitySource + ?Sized,
{
    match source.fetch_agents(count).await {
        Ok(mut agents) if !agents.is_empty() => {
            agents.truncate(count);
            agents
        }
        Ok(_) => {
            warn!("Activity source returned no agents, using mock roster");
            source.mock_roster(count)
        }
        Err(e) => {
            warn!("Failed to fetch agents: {}, using mock roster", e);
            source.mock_roster(count)
        }
    }
}
