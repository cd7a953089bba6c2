//! Conversation history configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the per-user transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Most recent turns kept per user
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Idle seconds before the store expires a transcript
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_max_turns() -> usize {
    5
}

fn default_ttl_secs() -> u64 {
    10800
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl HistoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Set the window size; at least one turn is always kept
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }
}
