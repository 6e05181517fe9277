//! Speed Derivation Engine - turns an agent's activity into a race speed.
//!
//! The engine scores a short "recent" activity window (and optionally a
//! longer "baseline" window for momentum), then deliberately injects a wide
//! random variance and a luck bonus so that low-activity agents can still
//! pull off upsets.
//!
//! # Formula
//!
//! ```text
//! activity = B + post + comment + engagement + quality + momentum
//! speed    = min((activity * chaos + luck) * (1 + karma / D), MAX)
//! chaos ~ U[chaos_min, chaos_max),  luck ~ U[luck_min, luck_max)
//! ```
//!
//! Every term is returned in a [`SpeedBreakdown`] so callers can show where
//! a speed came from, not just the final number.

use crate::error::SpeedError;
use botrace_env::{ActivitySnapshot, Agent, Comment, Post, RandomSource};
use serde::{Deserialize, Serialize};

/// Tunable parameters for speed derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedBalance {
    pub base_speed: f64,
    pub max_speed: f64,

    // Post scoring; every `*_chars` threshold counts UTF-16 code units
    pub post_base: f64,
    pub post_upvote: f64,
    pub post_long: f64,
    pub post_very_long: f64,
    pub post_title: f64,
    pub post_long_chars: usize,
    pub post_very_long_chars: usize,
    pub post_title_chars: usize,

    // Comment scoring
    pub comment_base: f64,
    pub comment_upvote: f64,
    pub comment_long: f64,
    pub comment_very_long: f64,
    pub comment_long_chars: usize,
    pub comment_very_long_chars: usize,

    // Engagement (comments per post)
    pub engagement_high: f64,
    pub engagement_medium: f64,
    pub engagement_high_ratio: f64,
    pub engagement_medium_ratio: f64,

    // Content quality
    pub keyword_racing: f64,
    pub keyword_technical: f64,
    pub mention_bonus: f64,
    pub question_bonus: f64,
    pub question_cap: f64,
    pub racing_keywords: Vec<String>,
    pub technical_keywords: Vec<String>,

    // Momentum (recent rate vs baseline rate)
    pub momentum_hot: f64,
    pub momentum_warm: f64,
    pub momentum_hot_ratio: f64,
    pub momentum_warm_ratio: f64,

    /// Lower = more karma impact
    pub karma_divisor: f64,

    // Variance
    pub chaos_min: f64,
    pub chaos_max: f64,
    pub luck_min: f64,
    pub luck_max: f64,
}

impl Default for SpeedBalance {
    fn default() -> Self {
        Self {
            base_speed: 180.0,
            max_speed: 380.0,

            post_base: 45.0,
            post_upvote: 3.0,
            post_long: 22.0,
            post_very_long: 35.0,
            post_title: 12.0,
            post_long_chars: 200,
            post_very_long_chars: 500,
            post_title_chars: 20,

            comment_base: 18.0,
            comment_upvote: 2.0,
            comment_long: 12.0,
            comment_very_long: 24.0,
            comment_long_chars: 100,
            comment_very_long_chars: 300,

            engagement_high: 35.0,
            engagement_medium: 18.0,
            engagement_high_ratio: 2.0,
            engagement_medium_ratio: 1.0,

            keyword_racing: 18.0,
            keyword_technical: 6.0,
            mention_bonus: 4.0,
            question_bonus: 2.0,
            question_cap: 20.0,
            racing_keywords: ["race", "speed", "fast", "racing", "moltbookarena", "track", "finish"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            technical_keywords: ["algorithm", "code", "implement", "function", "api", "data"]
                .iter()
                .map(|s| s.to_string())
                .collect(),

            momentum_hot: 55.0,
            momentum_warm: 28.0,
            momentum_hot_ratio: 2.0,
            momentum_warm_ratio: 1.5,

            karma_divisor: 15000.0,

            chaos_min: 0.6,
            chaos_max: 1.8,
            luck_min: 0.0,
            luck_max: 120.0,
        }
    }
}

/// Every term that went into one speed evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedBreakdown {
    pub base_speed: f64,
    pub post_score: f64,
    pub comment_score: f64,
    pub engagement_bonus: f64,
    pub quality_bonus: f64,
    pub momentum_bonus: f64,

    /// Multiplicative variance drawn for this evaluation
    pub chaos_factor: f64,

    /// Additive luck drawn for this evaluation
    pub luck_bonus: f64,

    pub karma_multiplier: f64,

    /// Clamped to `max_speed` and rounded to a whole unit
    pub final_speed: f64,
}

/// The speed derivation engine.
#[derive(Debug, Clone, Default)]
pub struct SpeedEngine {
    balance: SpeedBalance,
}

impl SpeedEngine {
    pub fn new(balance: SpeedBalance) -> Self {
        Self { balance }
    }

    pub fn balance(&self) -> &SpeedBalance {
        &self.balance
    }

    /// Derives a speed from recent activity, optional baseline activity and reputation.
    ///
    /// Draws exactly two values from `rng`: the chaos factor, then the luck bonus.
    ///
    /// # Errors
    /// Fails fast on invariant violations: non-finite or negative karma,
    /// zero-length windows, or a baseline window not longer than the recent one.
    pub fn derive<R: RandomSource + ?Sized>(
        &self,
        recent: &ActivitySnapshot,
        baseline: Option<&ActivitySnapshot>,
        agent: &Agent,
        rng: &mut R,
    ) -> Result<SpeedBreakdown, SpeedError> {
        self.check_inputs(recent, baseline, agent)?;
        let b = &self.balance;

        let post_score = self.post_score(&recent.posts);
        let comment_score = self.comment_score(&recent.comments);
        let engagement_bonus = self.engagement_bonus(recent);
        let quality_bonus = self.quality_bonus(&recent.posts, &recent.comments);
        let momentum_bonus = baseline
            .map(|baseline| self.momentum_bonus(recent, baseline))
            .unwrap_or(0.0);

        let activity = b.base_speed
            + post_score
            + comment_score
            + engagement_bonus
            + quality_bonus
            + momentum_bonus;

        let chaos_factor = rng.range(b.chaos_min, b.chaos_max);
        let luck_bonus = rng.range(b.luck_min, b.luck_max);
        let karma_multiplier = self.karma_multiplier(agent.karma);

        let speed = (activity * chaos_factor + luck_bonus) * karma_multiplier;
        let final_speed = speed.min(b.max_speed).max(0.0).round();

        Ok(SpeedBreakdown {
            base_speed: b.base_speed,
            post_score,
            comment_score,
            engagement_bonus,
            quality_bonus,
            momentum_bonus,
            chaos_factor,
            luck_bonus,
            karma_multiplier,
            final_speed,
        })
    }

    fn check_inputs(
        &self,
        recent: &ActivitySnapshot,
        baseline: Option<&ActivitySnapshot>,
        agent: &Agent,
    ) -> Result<(), SpeedError> {
        if !agent.karma.is_finite() || agent.karma < 0.0 {
            return Err(SpeedError::InvalidReputation(agent.karma));
        }
        if recent.window.is_zero() {
            return Err(SpeedError::InvalidWindow { which: "recent" });
        }
        if let Some(baseline) = baseline {
            if baseline.window.is_zero() {
                return Err(SpeedError::InvalidWindow { which: "baseline" });
            }
            if baseline.window <= recent.window {
                return Err(SpeedError::InvertedWindows {
                    recent_ms: recent.window.as_millis(),
                    baseline_ms: baseline.window.as_millis(),
                });
            }
        }
        Ok(())
    }

    /// Score from posts: base, upvotes, content length tiers and title length.
    pub fn post_score(&self, posts: &[Post]) -> f64 {
        let b = &self.balance;
        posts
            .iter()
            .map(|post| {
                let mut score = b.post_base + post.upvotes as f64 * b.post_upvote;
                let length = text_length(&post.content);
                if length > b.post_long_chars {
                    score += b.post_long;
                }
                if length > b.post_very_long_chars {
                    score += b.post_very_long;
                }
                if text_length(&post.title) > b.post_title_chars {
                    score += b.post_title;
                }
                score
            })
            .sum()
    }

    /// Score from comments: base, upvotes and content length tiers.
    pub fn comment_score(&self, comments: &[Comment]) -> f64 {
        let b = &self.balance;
        comments
            .iter()
            .map(|comment| {
                let mut score = b.comment_base + comment.upvotes as f64 * b.comment_upvote;
                let length = text_length(&comment.content);
                if length > b.comment_long_chars {
                    score += b.comment_long;
                }
                if length > b.comment_very_long_chars {
                    score += b.comment_very_long;
                }
                score
            })
            .sum()
    }

    /// Bonus for replying more than posting.
    pub fn engagement_bonus(&self, activity: &ActivitySnapshot) -> f64 {
        let b = &self.balance;
        let post_count = activity.posts.len().max(1) as f64;
        let reply_ratio = activity.comments.len() as f64 / post_count;

        if reply_ratio > b.engagement_high_ratio {
            b.engagement_high
        } else if reply_ratio > b.engagement_medium_ratio {
            b.engagement_medium
        } else {
            0.0
        }
    }

    /// Content analysis over all recent text, case-insensitive.
    pub fn quality_bonus(&self, posts: &[Post], comments: &[Comment]) -> f64 {
        let b = &self.balance;
        let corpus = posts
            .iter()
            .map(|p| format!("{} {}", p.content, p.title))
            .chain(comments.iter().map(|c| c.content.clone()))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut bonus = 0.0;

        // Once, however many racing words appear
        if b.racing_keywords.iter().any(|k| corpus.contains(k.as_str())) {
            bonus += b.keyword_racing;
        }

        let technical_hits = b
            .technical_keywords
            .iter()
            .filter(|k| corpus.contains(k.as_str()))
            .count();
        bonus += technical_hits as f64 * b.keyword_technical;

        bonus += count_mentions(&corpus) as f64 * b.mention_bonus;

        let questions = corpus.matches('?').count() as f64;
        bonus += (questions * b.question_bonus).min(b.question_cap);

        bonus
    }

    /// Bonus when the recent activity rate spikes above the baseline rate.
    pub fn momentum_bonus(&self, recent: &ActivitySnapshot, baseline: &ActivitySnapshot) -> f64 {
        let b = &self.balance;
        let total = baseline.interaction_count();
        if total == 0 {
            return 0.0;
        }

        let recent_rate = recent.interaction_count() as f64 / recent.window_minutes();
        let baseline_rate = total as f64 / baseline.window_minutes();

        if recent_rate > baseline_rate * b.momentum_hot_ratio {
            b.momentum_hot
        } else if recent_rate > baseline_rate * b.momentum_warm_ratio {
            b.momentum_warm
        } else {
            0.0
        }
    }

    /// `1 + karma / divisor`.
    pub fn karma_multiplier(&self, karma: f64) -> f64 {
        1.0 + karma / self.balance.karma_divisor
    }
}

/// Counts `@handle` tokens: an `@` followed by at least one ASCII word character.
fn count_mentions(text: &str) -> usize {
    let bytes = text.as_bytes();
    let is_word = |c: u8| c.is_ascii_alphanumeric() || c == b'_';

    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'@' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && is_word(bytes[end]) {
                end += 1;
            }
            if end > start {
                count += 1;
                i = end;
                continue;
            }
        }
        i += 1;
    }
    count
}

/// Length of `text` as the platform reports it: UTF-16 code units, so an
/// emoji outside the BMP counts twice.
fn text_length(text: &str) -> usize {
    text.encode_utf16().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use botrace_env::SequenceRandom;
    use proptest::prelude::*;
    use std::time::Duration;

    const RECENT: Duration = Duration::from_secs(5 * 60);
    const BASELINE: Duration = Duration::from_secs(30 * 60);

    fn agent(karma: f64) -> Agent {
        Agent::new("a1", "Tester", karma)
    }

    fn posts(n: usize) -> Vec<Post> {
        (0..n).map(|_| Post::new("t", "short", 0)).collect()
    }

    fn comments(n: usize) -> Vec<Comment> {
        (0..n).map(|_| Comment::new("ok", 0)).collect()
    }

    #[test]
    fn test_empty_activity_at_minimum_draws() {
        let engine = SpeedEngine::default();
        let mut rng = SequenceRandom::constant(0.0);
        let result = engine
            .derive(&ActivitySnapshot::empty(RECENT), None, &agent(0.0), &mut rng)
            .unwrap();

        assert_eq!(result.post_score, 0.0);
        assert_eq!(result.comment_score, 0.0);
        assert_eq!(result.engagement_bonus, 0.0);
        assert_eq!(result.quality_bonus, 0.0);
        assert_eq!(result.momentum_bonus, 0.0);
        assert_eq!(result.karma_multiplier, 1.0);
        assert_relative_eq!(result.chaos_factor, 0.6);
        assert_eq!(result.luck_bonus, 0.0);
        assert_eq!(result.final_speed, 108.0); // 180 * 0.6
        assert_eq!(rng.draws(), 2);
    }

    #[test]
    fn test_maximum_draws_clamp_to_max_speed() {
        let engine = SpeedEngine::default();
        let mut rng = SequenceRandom::constant(1.0);
        let result = engine
            .derive(&ActivitySnapshot::empty(RECENT), None, &agent(0.0), &mut rng)
            .unwrap();

        // 180 * 1.8 + 120 = 444 > 380
        assert_eq!(result.final_speed, 380.0);
    }

    #[test]
    fn test_same_draws_reproduce_breakdown() {
        let engine = SpeedEngine::default();
        let recent = ActivitySnapshot::empty(RECENT)
            .with_posts(vec![Post::new("A long enough title here", "race day", 3)])
            .with_comments(comments(2));

        let a = engine
            .derive(&recent, None, &agent(900.0), &mut SequenceRandom::new(vec![0.3, 0.7]))
            .unwrap();
        let b = engine
            .derive(&recent, None, &agent(900.0), &mut SequenceRandom::new(vec![0.3, 0.7]))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_post_score_tiers() {
        let engine = SpeedEngine::default();
        let post = Post::new("x".repeat(25), "y".repeat(600), 10);
        // 45 + 10*3 + 22 + 35 + 12
        assert_eq!(engine.post_score(&[post]), 144.0);

        let medium = Post::new("short", "y".repeat(201), 0);
        assert_eq!(engine.post_score(&[medium]), 67.0);

        // Thresholds are strict
        let edge = Post::new("x".repeat(20), "y".repeat(200), 0);
        assert_eq!(engine.post_score(&[edge]), 45.0);
    }

    #[test]
    fn test_comment_score_tiers() {
        let engine = SpeedEngine::default();
        let long = Comment::new("c".repeat(350), 3);
        // 18 + 3*2 + 12 + 24
        assert_eq!(engine.comment_score(&[long]), 60.0);
        assert_eq!(engine.comment_score(&[Comment::new("c".repeat(101), 0)]), 30.0);
        assert_eq!(engine.comment_score(&[]), 0.0);
    }

    #[test]
    fn test_lengths_count_utf16_units() {
        let engine = SpeedEngine::default();

        // 60 chars, 120 UTF-16 units
        let flags = Comment::new("🏁".repeat(60), 0);
        assert_eq!(engine.comment_score(&[flags]), 30.0);
        let accents = Comment::new("é".repeat(60), 0);
        assert_eq!(engine.comment_score(&[accents]), 18.0);

        // 11-char title, 22 units
        let rockets = Post::new("🚀".repeat(11), "short", 0);
        assert_eq!(engine.post_score(&[rockets]), 57.0);
    }

    #[test]
    fn test_engagement_tiers() {
        let engine = SpeedEngine::default();
        let high = ActivitySnapshot::empty(RECENT).with_comments(comments(3));
        let medium = ActivitySnapshot::empty(RECENT)
            .with_posts(posts(2))
            .with_comments(comments(3));
        let none = ActivitySnapshot::empty(RECENT)
            .with_posts(posts(2))
            .with_comments(comments(2));

        assert_eq!(engine.engagement_bonus(&high), 35.0);
        assert_eq!(engine.engagement_bonus(&medium), 18.0);
        assert_eq!(engine.engagement_bonus(&none), 0.0);
    }

    #[test]
    fn test_quality_bonus_components() {
        let engine = SpeedEngine::default();
        let comment = Comment::new(
            "Racing FAST! @alice @bob_2 what about the Algorithm and API? really?",
            0,
        );
        // racing 18 (once) + technical 2*6 + mentions 2*4 + questions 2*2
        assert_eq!(engine.quality_bonus(&[], &[comment]), 42.0);
    }

    #[test]
    fn test_quality_counts_title_and_distinct_keywords_once() {
        let engine = SpeedEngine::default();
        let post = Post::new("new code drop", "code code code", 0);
        assert_eq!(engine.quality_bonus(&[post], &[]), 6.0);
    }

    #[test]
    fn test_question_bonus_is_capped() {
        let engine = SpeedEngine::default();
        let comment = Comment::new("?".repeat(15), 0);
        assert_eq!(engine.quality_bonus(&[], &[comment]), 20.0);
    }

    #[test]
    fn test_count_mentions() {
        assert_eq!(count_mentions("hi @a and @b_c"), 2);
        assert_eq!(count_mentions("@ alone"), 0);
        assert_eq!(count_mentions("@@twice"), 1);
        assert_eq!(count_mentions("mail@example"), 1);
        assert_eq!(count_mentions(""), 0);
    }

    #[test]
    fn test_momentum_tiers() {
        let engine = SpeedEngine::default();
        let baseline = ActivitySnapshot::empty(BASELINE).with_comments(comments(6)); // 0.2/min

        let hot = ActivitySnapshot::empty(RECENT).with_comments(comments(3)); // 0.6/min
        let warm = ActivitySnapshot::empty(RECENT).with_comments(comments(2)); // 0.4/min
        let flat = ActivitySnapshot::empty(RECENT).with_comments(comments(1)); // 0.2/min

        assert_eq!(engine.momentum_bonus(&hot, &baseline), 55.0);
        assert_eq!(engine.momentum_bonus(&warm, &baseline), 28.0);
        assert_eq!(engine.momentum_bonus(&flat, &baseline), 0.0);
    }

    #[test]
    fn test_momentum_zero_without_baseline_activity() {
        let engine = SpeedEngine::default();
        let recent = ActivitySnapshot::empty(RECENT).with_comments(comments(4));
        let mut rng = SequenceRandom::constant(0.5);

        let absent = engine.derive(&recent, None, &agent(0.0), &mut rng).unwrap();
        let empty = engine
            .derive(&recent, Some(&ActivitySnapshot::empty(BASELINE)), &agent(0.0), &mut rng)
            .unwrap();

        assert_eq!(absent.momentum_bonus, 0.0);
        assert_eq!(empty.momentum_bonus, 0.0);
    }

    #[test]
    fn test_karma_multiplier() {
        let engine = SpeedEngine::default();
        assert_eq!(engine.karma_multiplier(0.0), 1.0);
        assert_eq!(engine.karma_multiplier(15000.0), 2.0);

        let mut rng = SequenceRandom::constant(0.0);
        let result = engine
            .derive(&ActivitySnapshot::empty(RECENT), None, &agent(15000.0), &mut rng)
            .unwrap();
        assert_eq!(result.final_speed, 216.0);
    }

    #[test]
    fn test_invalid_inputs_fail_fast() {
        let engine = SpeedEngine::default();
        let mut rng = SequenceRandom::constant(0.5);
        let recent = ActivitySnapshot::empty(RECENT);

        assert_eq!(
            engine.derive(&recent, None, &agent(-1.0), &mut rng),
            Err(SpeedError::InvalidReputation(-1.0))
        );
        assert!(matches!(
            engine.derive(&recent, None, &agent(f64::NAN), &mut rng),
            Err(SpeedError::InvalidReputation(_))
        ));
        assert_eq!(
            engine.derive(&ActivitySnapshot::empty(Duration::ZERO), None, &agent(0.0), &mut rng),
            Err(SpeedError::InvalidWindow { which: "recent" })
        );
        assert!(matches!(
            engine.derive(&recent, Some(&ActivitySnapshot::empty(RECENT)), &agent(0.0), &mut rng),
            Err(SpeedError::InvertedWindows { .. })
        ));
        // Nothing drawn when inputs are rejected
        assert_eq!(rng.draws(), 0);
    }

    #[test]
    fn test_final_speed_is_rounded() {
        let engine = SpeedEngine::default();
        // chaos = 0.6 + 0.5 * 1.2 = 1.2, luck = 0.5 * 120 = 60 -> 180 * 1.2 + 60 = 276
        // karma 100 -> * 1.00666.. = 277.84
        let mut rng = SequenceRandom::constant(0.5);
        let result = engine
            .derive(&ActivitySnapshot::empty(RECENT), None, &agent(100.0), &mut rng)
            .unwrap();
        assert_eq!(result.final_speed, 278.0);
    }

    proptest! {
        #[test]
        fn prop_final_speed_bounded(
            karma in 0.0f64..1.0e7,
            upvotes in proptest::collection::vec(0u32..10_000, 0..12),
            comment_count in 0usize..20,
            baseline_count in 0usize..40,
            draw_a in 0.0f64..1.0,
            draw_b in 0.0f64..1.0,
        ) {
            let engine = SpeedEngine::default();
            let recent = ActivitySnapshot::empty(RECENT)
                .with_posts(upvotes.iter().map(|u| Post::new("title", "race @x?", *u)).collect())
                .with_comments(comments(comment_count));
            let baseline =
                ActivitySnapshot::empty(BASELINE).with_comments(comments(baseline_count));
            let mut rng = SequenceRandom::new(vec![draw_a, draw_b]);

            let result = engine.derive(&recent, Some(&baseline), &agent(karma), &mut rng).unwrap();
            prop_assert!(result.final_speed.is_finite());
            prop_assert!(result.final_speed >= 0.0);
            prop_assert!(result.final_speed <= engine.balance().max_speed);
        }

        #[test]
        fn prop_upvote_never_lowers_post_score(
            upvotes in proptest::collection::vec(0u32..10_000, 1..8),
            index in 0usize..8,
        ) {
            let engine = SpeedEngine::default();
            let mut list: Vec<Post> = upvotes.iter().map(|u| Post::new("t", "c", *u)).collect();
            let before = engine.post_score(&list);
            let i = index % list.len();
            list[i].upvotes += 1;
            prop_assert!(engine.post_score(&list) >= before);
        }
    }
}
