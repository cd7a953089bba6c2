//! Counters and timings for cache and history traffic
//!
//! These go through the `metrics` facade and cost nothing until a recorder is
//! installed by the embedding application.

use std::time::Duration;

use metrics::{counter, histogram};

/// Outcome label for a cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    ExactHit,
    SimilarHit,
    Miss,
    Recovered,
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactHit => "exact_hit",
            Self::SimilarHit => "similar_hit",
            Self::Miss => "miss",
            Self::Recovered => "recovered",
        }
    }
}

fn status_label(success: bool) -> &'static str {
    if success { "ok" } else { "recovered" }
}

pub fn record_cache_lookup(outcome: LookupOutcome, duration: Duration) {
    counter!("semantic_cache_lookups_total", "outcome" => outcome.as_str()).increment(1);
    histogram!("semantic_cache_lookup_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_cache_write(success: bool) {
    counter!("semantic_cache_writes_total", "status" => status_label(success)).increment(1);
}

pub fn record_cache_eviction() {
    counter!("semantic_cache_evictions_total").increment(1);
}

pub fn record_history_write(success: bool) {
    counter!("conversation_history_writes_total", "status" => status_label(success)).increment(1);
}

pub fn record_expired_purged(container: &str, purged: usize) {
    counter!("store_expired_purged_total", "container" => container.to_string())
        .increment(purged as u64);
}
