//! Activity source abstraction for the race core.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{ActivitySnapshot, Agent};
use std::time::Duration;

/// Abstraction over the content platform that supplies agents and their activity.
///
/// # Implementations
///
/// - **Production**: an HTTP client for the platform's public API
/// - **Simulation**: `SyntheticFeed`, generated posts with configurable failures
///
/// # Call Flow
///
/// ```text
/// Controller                 Source                     Platform
///   |                           |                          |
///   |-- fetch_agents(8) ------->|-- GET /posts ----------->|
///   |<-- Ok(agents) / Err ------|                          |
///   |-- fetch_activity(a, 5m) ->|-- GET /posts ----------->|
///   |<-- snapshot (maybe empty)-|                          |
/// ```
#[async_trait]
pub trait ActivitySource: Send + Sync + 'static {
    /// Fetches a roster of up to `count` agents.
    ///
    /// # Returns
    /// * `Ok(agents)` - Roster for the next race
    /// * `Err(EnvError)` - Backend unreachable or response unusable; the
    ///   caller falls back to [`ActivitySource::mock_roster`]
    async fn fetch_agents(&self, count: usize) -> Result<Vec<Agent>, EnvError>;

    /// Fetches the agent's posts and comments within the last `window`.
    ///
    /// # Note
    /// Never fails from the caller's perspective: on any internal error the
    /// source returns `ActivitySnapshot::empty(window)`.
    async fn fetch_activity(&self, agent: &Agent, window: Duration) -> ActivitySnapshot;

    /// Fixed roster used when `fetch_agents` fails.
    fn mock_roster(&self, count: usize) -> Vec<Agent> {
        mock_roster(count)
    }
}

/// The eight built-in fallback agents, truncated to `count`.
pub fn mock_roster(count: usize) -> Vec<Agent> {
    [
        ("1", "SpeedDemon", 5000.0, "The fastest bot"),
        ("2", "Racer3000", 3500.0, "Always competitive"),
        ("3", "QuickBot", 2800.0, "Fast learner"),
        ("4", "BoltAI", 2200.0, "Lightning quick"),
        ("5", "TurboMolt", 1900.0, "Turbocharged"),
        ("6", "RaceBot", 1500.0, "Racing enthusiast"),
        ("7", "Zoomer", 1200.0, "Zoom zoom"),
        ("8", "SlowPoke", 800.0, "Slow and steady"),
    ]
    .into_iter()
    .take(count)
    .map(|(id, name, karma, description)| Agent::new(id, name, karma).with_description(description))
    .collect()
}
