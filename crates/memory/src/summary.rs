//! Prose summaries and the staleness bookkeeping that invalidates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub user_id: String,
    pub prose_text: String,
    pub generated_at: DateTime<Utc>,
    pub generation_version: u32,
}

impl Summary {
    pub fn new(user_id: impl Into<String>, prose_text: impl Into<String>, generation_version: u32) -> Self {
        Self {
            user_id: user_id.into(),
            prose_text: prose_text.into(),
            generated_at: Utc::now(),
            generation_version,
        }
    }
}

/// Tracks what's happened since a user's last summary was generated, so
/// `is_stale` doesn't need to scan the whole graph. Updated transactionally
/// alongside every entity/relation mutation in `store.rs`.
///
/// The exact mutation-count threshold is a product decision the spec
/// leaves open (§9, open question iii); `DEFAULT_STALENESS_MUTATION_THRESHOLD`
/// records the value chosen here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalenessCounter {
    pub mutations_since_summary: u64,
    pub user_edited_since_summary: bool,
}

pub const DEFAULT_STALENESS_MUTATION_THRESHOLD: u64 = 10;

impl Default for StalenessCounter {
    fn default() -> Self {
        Self {
            mutations_since_summary: 0,
            user_edited_since_summary: false,
        }
    }
}

impl StalenessCounter {
    pub fn record_mutation(&mut self, is_user_edit: bool) {
        self.mutations_since_summary += 1;
        self.user_edited_since_summary = self.user_edited_since_summary || is_user_edit;
    }

    pub fn is_stale(&self, threshold: u64) -> bool {
        self.user_edited_since_summary || self.mutations_since_summary > threshold
    }

    pub fn reset(&mut self) {
        self.mutations_since_summary = 0;
        self.user_edited_since_summary = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_edit_forces_staleness_regardless_of_count() {
        let mut counter = StalenessCounter::default();
        counter.record_mutation(true);
        assert!(counter.is_stale(DEFAULT_STALENESS_MUTATION_THRESHOLD));
    }

    #[test]
    fn reset_clears_staleness() {
        let mut counter = StalenessCounter::default();
        counter.record_mutation(true);
        counter.reset();
        assert!(!counter.is_stale(DEFAULT_STALENESS_MUTATION_THRESHOLD));
    }

    #[test]
    fn count_alone_trips_threshold() {
        let mut counter = StalenessCounter::default();
        for _ in 0..=DEFAULT_STALENESS_MUTATION_THRESHOLD {
            counter.record_mutation(false);
        }
        assert!(counter.is_stale(DEFAULT_STALENESS_MUTATION_THRESHOLD));
    }
}
