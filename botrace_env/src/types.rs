//! Common types shared between the race core and its activity source.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for an agent on the content platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    /// Creates an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a deterministic id from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        let shown: String = self.0.chars().take(8).collect();
        write!(f, "{}", shown)
    }
}

/// The agent's most upvoted recent post, kept for the results screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: String,
    pub title: String,
    pub upvotes: u32,
}

/// An agent whose public activity drives one competitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,

    /// Display name
    pub name: String,

    /// Reputation score ("karma"), as reported by the platform
    pub karma: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_post: Option<PostSummary>,
}

impl Agent {
    /// Creates an agent with no description or post summary.
    pub fn new(id: impl Into<String>, name: impl Into<String>, karma: f64) -> Self {
        Self {
            id: AgentId::new(id),
            name: name.into(),
            karma,
            description: None,
            recent_post: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Karma as used for a race: non-finite or negative values become 0.
    pub fn normalized_reputation(&self) -> f64 {
        if self.karma.is_finite() && self.karma > 0.0 {
            self.karma
        } else {
            0.0
        }
    }
}

/// A post authored by an agent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub upvotes: u32,
}

impl Post {
    pub fn new(title: impl Into<String>, content: impl Into<String>, upvotes: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            upvotes,
        }
    }
}

/// A comment authored by an agent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub upvotes: u32,
}

impl Comment {
    pub fn new(content: impl Into<String>, upvotes: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            upvotes,
        }
    }
}

/// Posts and comments by one agent inside a time window ending "now".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySnapshot {
    pub posts: Vec<Post>,
    pub comments: Vec<Comment>,

    /// Length of the window the snapshot covers
    pub window: Duration,
}

impl ActivitySnapshot {
    /// An empty snapshot for the given window.
    ///
    /// This is what a source returns when it cannot reach its backend.
    pub fn empty(window: Duration) -> Self {
        Self {
            posts: Vec::new(),
            comments: Vec::new(),
            window,
        }
    }

    pub fn with_posts(mut self, posts: Vec<Post>) -> Self {
        self.posts = posts;
        self
    }

    pub fn with_comments(mut self, comments: Vec<Comment>) -> Self {
        self.comments = comments;
        self
    }

    /// Number of posts plus comments.
    pub fn interaction_count(&self) -> usize {
        self.posts.len() + self.comments.len()
    }

    /// Sum of upvotes over posts and comments.
    pub fn total_upvotes(&self) -> u64 {
        let posts: u64 = self.posts.iter().map(|p| p.upvotes as u64).sum();
        let comments: u64 = self.comments.iter().map(|c| c.upvotes as u64).sum();
        posts + comments
    }

    pub fn is_empty(&self) -> bool {
        self.interaction_count() == 0
    }

    /// Window length in minutes.
    pub fn window_minutes(&self) -> f64 {
        self.window.as_secs_f64() / 60.0
    }
}
