//! Synthetic activity feed for simulation.
//!
//! The feed plays the part of the content platform:
//! - A generated pool of agents with reputation and a "chattiness" level;
//!   each roster fetch draws a fresh random field from it
//! - Posts and comments generated per window, scaled by window length
//! - Injectable faults (roster outage, malformed snapshots, fetch latency)

use crate::context::SimContext;
use async_trait::async_trait;
use botrace_env::{
    ActivitySnapshot, ActivitySource, Agent, AgentId, Comment, EnvError, Post, PostSummary,
    RaceContext,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const NAME_PREFIXES: &[&str] = &[
    "Turbo", "Nitro", "Pixel", "Quantum", "Rusty", "Hyper", "Echo", "Drift", "Vector", "Comet",
];
const NAME_SUFFIXES: &[&str] = &["Bot", "Runner", "Molt", "Agent", "Racer", "Mind"];

const TITLES: &[&str] = &[
    "Race day notes",
    "How I implement a faster search algorithm",
    "Thoughts on the arena",
    "Benchmarking my API client against the data set",
    "Finish line strategy for the next race",
    "Hello",
    "What makes a good agent?",
];

const SENTENCES: &[&str] = &[
    "The track felt fast today.",
    "I rewrote the function that parses the data feed.",
    "Anyone else watching the race?",
    "Shoutout to @speeddemon for the tips.",
    "This code path was the bottleneck all along.",
    "Slow and steady still wins sometimes.",
    "Working on a new algorithm for ranking replies.",
    "Can we talk about api rate limits?",
    "Great thread, thanks for sharing.",
    "See you at the finish @turbomolt",
];

/// Rates and sizes for generated activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Average posts per hour for an agent of chattiness 1.0
    pub posts_per_hour: f64,

    /// Average comments per hour for an agent of chattiness 1.0
    pub comments_per_hour: f64,

    /// Upper bound (exclusive) on generated upvotes per item
    pub max_upvotes: u32,

    /// Chattiness range across the roster
    pub chattiness_min: f64,
    pub chattiness_max: f64,

    /// Karma range across the roster
    pub karma_min: f64,
    pub karma_max: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            posts_per_hour: 6.0,
            comments_per_hour: 24.0,
            max_upvotes: 25,
            chattiness_min: 0.0,
            chattiness_max: 2.0,
            karma_min: 0.0,
            karma_max: 6000.0,
        }
    }
}

/// Simulated content platform.
pub struct SyntheticFeed {
    config: FeedConfig,

    pool: Vec<Agent>,

    /// Activity multiplier per agent; unknown agents use 1.0
    chattiness: HashMap<AgentId, f64>,

    rng: Mutex<ChaCha8Rng>,

    /// Roster fetches fail while set
    roster_down: bool,

    /// Agents whose snapshots come back with a zero-length window
    corrupted: HashSet<AgentId>,

    /// Probability that any other snapshot comes back malformed
    flake_rate: f64,

    /// Virtual fetch latency for activity requests
    latency: Option<(Arc<SimContext>, Duration)>,

    activity_fetches: AtomicU64,
}

impl SyntheticFeed {
    /// Creates a feed with a generated pool of `pool_size` agents.
    pub fn new(seed: u64, pool_size: usize) -> Self {
        Self::with_config(seed, pool_size, FeedConfig::default())
    }

    pub fn with_config(seed: u64, pool_size: usize, config: FeedConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut pool = Vec::with_capacity(pool_size);
        let mut chattiness = HashMap::with_capacity(pool_size);

        for i in 0..pool_size {
            let prefix = NAME_PREFIXES[rng.gen_range(0..NAME_PREFIXES.len())];
            let suffix = NAME_SUFFIXES[rng.gen_range(0..NAME_SUFFIXES.len())];
            let mut agent = Agent {
                id: AgentId::from_seed(seed.wrapping_add(i as u64)),
                name: format!("{}{}{}", prefix, suffix, i + 1),
                karma: rng.gen_range(config.karma_min..=config.karma_max).round(),
                description: None,
                recent_post: None,
            };
            agent.recent_post = Some(PostSummary {
                id: format!("post-{}-{}", seed, i),
                title: TITLES[rng.gen_range(0..TITLES.len())].to_string(),
                upvotes: rng.gen_range(0..config.max_upvotes.max(1)),
            });
            chattiness.insert(
                agent.id.clone(),
                rng.gen_range(config.chattiness_min..=config.chattiness_max),
            );
            pool.push(agent);
        }

        Self {
            config,
            pool,
            chattiness,
            rng: Mutex::new(rng),
            roster_down: false,
            corrupted: HashSet::new(),
            flake_rate: 0.0,
            latency: None,
            activity_fetches: AtomicU64::new(0),
        }
    }

    /// Makes every roster fetch fail.
    pub fn with_roster_outage(mut self) -> Self {
        self.roster_down = true;
        self
    }

    /// Makes the given agent's snapshots malformed (zero-length window).
    pub fn with_corrupted(mut self, agent: AgentId) -> Self {
        self.corrupted.insert(agent);
        self
    }

    /// Makes each snapshot malformed with probability `rate`.
    pub fn with_flake_rate(mut self, rate: f64) -> Self {
        self.flake_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Delays every activity fetch by `latency` of virtual time.
    pub fn with_latency(mut self, ctx: Arc<SimContext>, latency: Duration) -> Self {
        self.latency = Some((ctx, latency));
        self
    }

    /// Every agent the feed can field.
    pub fn pool(&self) -> &[Agent] {
        &self.pool
    }

    /// Total `fetch_activity` calls served.
    pub fn activity_fetches(&self) -> u64 {
        self.activity_fetches.load(Ordering::Relaxed)
    }

    fn flakes(&self) -> bool {
        if self.flake_rate <= 0.0 {
            return false;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_bool(self.flake_rate),
            Err(_) => false,
        }
    }

    fn chattiness_of(&self, agent: &AgentId) -> f64 {
        self.chattiness.get(agent).copied().unwrap_or(1.0)
    }

    fn generate(&self, agent: &Agent, window: Duration) -> ActivitySnapshot {
        let hours = window.as_secs_f64() / 3600.0;
        let level = self.chattiness_of(&agent.id);

        let Ok(mut rng) = self.rng.lock() else {
            return ActivitySnapshot::empty(window);
        };

        let post_count = sample_count(&mut *rng, self.config.posts_per_hour * level * hours);
        let comment_count = sample_count(&mut *rng, self.config.comments_per_hour * level * hours);

        let posts = (0..post_count)
            .map(|_| {
                let title = TITLES[rng.gen_range(0..TITLES.len())];
                let content = paragraph(&mut *rng, 1..12);
                Post::new(title, content, rng.gen_range(0..self.config.max_upvotes.max(1)))
            })
            .collect();
        let comments = (0..comment_count)
            .map(|_| {
                let content = paragraph(&mut *rng, 1..6);
                Comment::new(content, rng.gen_range(0..self.config.max_upvotes.max(1)))
            })
            .collect();

        ActivitySnapshot::empty(window)
            .with_posts(posts)
            .with_comments(comments)
    }
}

/// Draws an item count around `expected`, never negative.
fn sample_count<R: Rng + ?Sized>(rng: &mut R, expected: f64) -> usize {
    if expected <= 0.0 {
        return 0;
    }
    (expected * rng.gen_range(0.5..1.5)).round() as usize
}

fn paragraph<R: Rng + ?Sized>(rng: &mut R, sentences: std::ops::Range<usize>) -> String {
    let count = rng.gen_range(sentences);
    (0..count)
        .filter_map(|_| SENTENCES.choose(&mut *rng).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl ActivitySource for SyntheticFeed {
    async fn fetch_agents(&self, count: usize) -> Result<Vec<Agent>, EnvError> {
        if self.roster_down {
            return Err(EnvError::unavailable("synthetic roster offline"));
        }
        let Ok(mut rng) = self.rng.lock() else {
            return Ok(self.pool.iter().take(count).cloned().collect());
        };
        Ok(self.pool.choose_multiple(&mut *rng, count).cloned().collect())
    }

    async fn fetch_activity(&self, agent: &Agent, window: Duration) -> ActivitySnapshot {
        if let Some((ctx, latency)) = &self.latency {
            let deadline = ctx.now() + *latency;
            ctx.wait_until(deadline).await;
        }
        self.activity_fetches.fetch_add(1, Ordering::Relaxed);

        if self.corrupted.contains(&agent.id) || self.flakes() {
            debug!("Serving malformed snapshot for {}", agent.name);
            return ActivitySnapshot::empty(Duration::ZERO);
        }
        self.generate(agent, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_is_deterministic_per_seed() {
        let a = SyntheticFeed::new(42, 8);
        let b = SyntheticFeed::new(42, 8);
        let c = SyntheticFeed::new(43, 8);

        assert_eq!(a.pool(), b.pool());
        assert_ne!(a.pool(), c.pool());
        assert_eq!(a.pool().len(), 8);
        for agent in a.pool() {
            assert!(agent.karma >= 0.0 && agent.karma <= 6000.0);
            assert!(agent.recent_post.is_some());
        }
    }

    #[tokio::test]
    async fn test_fetch_agents_draws_fresh_field_from_pool() {
        let feed = SyntheticFeed::new(1, 32);

        let first = feed.fetch_agents(8).await.unwrap();
        let second = feed.fetch_agents(8).await.unwrap();

        for field in [&first, &second] {
            assert_eq!(field.len(), 8);
            let ids: HashSet<&AgentId> = field.iter().map(|a| &a.id).collect();
            assert_eq!(ids.len(), 8);
            assert!(field.iter().all(|a| feed.pool().contains(a)));
        }
        let first_ids: HashSet<&AgentId> = first.iter().map(|a| &a.id).collect();
        let second_ids: HashSet<&AgentId> = second.iter().map(|a| &a.id).collect();
        assert_ne!(first_ids, second_ids);
    }

    #[tokio::test]
    async fn test_fetch_agents_small_pool_fields_everyone() {
        let feed = SyntheticFeed::new(1, 4);
        let field = feed.fetch_agents(8).await.unwrap();
        assert_eq!(field.len(), 4);
    }

    #[tokio::test]
    async fn test_roster_outage() {
        let feed = SyntheticFeed::new(1, 8).with_roster_outage();
        assert!(matches!(
            feed.fetch_agents(8).await,
            Err(EnvError::SourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_longer_window_has_more_activity() {
        let config = FeedConfig {
            chattiness_min: 1.0,
            chattiness_max: 1.0,
            ..FeedConfig::default()
        };
        let feed = SyntheticFeed::with_config(9, 1, config);
        let agent = feed.pool()[0].clone();

        let recent = feed.fetch_activity(&agent, Duration::from_secs(5 * 60)).await;
        let baseline = feed.fetch_activity(&agent, Duration::from_secs(30 * 60)).await;

        assert_eq!(recent.window, Duration::from_secs(5 * 60));
        // 5min at 24/h: 1..=3 comments; 30min: 6..=18
        assert!(recent.comments.len() <= 3);
        assert!(baseline.comments.len() >= 6);
        assert_eq!(feed.activity_fetches(), 2);
    }

    #[tokio::test]
    async fn test_quiet_agent_has_no_activity() {
        let config = FeedConfig {
            chattiness_min: 0.0,
            chattiness_max: 0.0,
            ..FeedConfig::default()
        };
        let feed = SyntheticFeed::with_config(9, 2, config);
        let agent = feed.pool()[1].clone();
        let snapshot = feed.fetch_activity(&agent, Duration::from_secs(3600)).await;
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_agent_gets_malformed_snapshot() {
        let feed = SyntheticFeed::new(3, 4);
        let victim = feed.pool()[2].clone();
        let feed = feed.with_corrupted(victim.id.clone());

        let snapshot = feed.fetch_activity(&victim, Duration::from_secs(300)).await;
        assert_eq!(snapshot.window, Duration::ZERO);

        let other = feed.pool()[0].clone();
        let snapshot = feed.fetch_activity(&other, Duration::from_secs(300)).await;
        assert_eq!(snapshot.window, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_flake_rate_extremes() {
        let always = SyntheticFeed::new(5, 2).with_flake_rate(1.0);
        let agent = always.pool()[0].clone();
        for _ in 0..10 {
            let snapshot = always.fetch_activity(&agent, Duration::from_secs(300)).await;
            assert_eq!(snapshot.window, Duration::ZERO);
        }

        let never = SyntheticFeed::new(5, 2).with_flake_rate(0.0);
        for _ in 0..10 {
            let snapshot = never.fetch_activity(&agent, Duration::from_secs(300)).await;
            assert_eq!(snapshot.window, Duration::from_secs(300));
        }
    }

    #[tokio::test]
    async fn test_latency_waits_on_virtual_clock() {
        let ctx = SimContext::shared(1);
        let feed = Arc::new(
            SyntheticFeed::new(1, 2).with_latency(Arc::clone(&ctx), Duration::from_millis(500)),
        );
        let agent = feed.pool()[0].clone();

        let fetch = {
            let feed = Arc::clone(&feed);
            tokio::spawn(async move { feed.fetch_activity(&agent, Duration::from_secs(300)).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(feed.activity_fetches(), 0);

        let mut steps = 0;
        while !fetch.is_finished() && steps < 100 {
            ctx.advance_time(Duration::from_millis(100));
            tokio::task::yield_now().await;
            steps += 1;
        }
        assert!(ctx.now() >= Duration::from_millis(500));
        let snapshot = fetch.await.unwrap();
        assert_eq!(snapshot.window, Duration::from_secs(300));
        assert_eq!(feed.activity_fetches(), 1);
    }
}
