use std::collections::HashSet;
use tracing::debug;

use crate::pipeline::processing::clean::CleanedRecord;

/// First-kept duplicate filter over cleaned records, keyed on the composite
/// `(reviewer_id, product_id)` pair. Runs after cleaning so the key fields
/// are normalized, and before enrichment so dropped records never pay for
/// derivation.
pub struct Deduplicator {
    seen: HashSet<(String, String)>,
    dropped: u64,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
            dropped: 0,
        }
    }

    /// Returns true the first time a key is observed; later occurrences are
    /// counted and reported as duplicates. Records without a key (ruled out
    /// by validation) pass through untouched.
    pub fn observe(&mut self, record: &CleanedRecord) -> bool {
        let Some(key) = record.dedup_key() else {
            return true;
        };
        if self.seen.insert(key) {
            true
        } else {
            self.dropped += 1;
            debug!(
                reviewer_id = record.reviewer_id().unwrap_or(""),
                product_id = record.product_id().unwrap_or(""),
                "Dropping duplicate review"
            );
            false
        }
    }

    /// Number of duplicates dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of distinct keys observed so far.
    pub fn unique_keys(&self) -> usize {
        self.seen.len()
    }

    /// Convenience wrapper: filters a whole batch, preserving input order.
    pub fn dedup_batch(&mut self, records: Vec<CleanedRecord>) -> Vec<CleanedRecord> {
        records
            .into_iter()
            .filter(|record| self.observe(record))
            .collect()
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}
