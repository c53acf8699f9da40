//! Violation Log - bounded ring buffer
//!
//! Giữ tối đa `capacity` entries gần nhất, entry cũ nhất bị evict.

use std::collections::VecDeque;

use super::types::ViolationEntry;

/// Default ring-buffer capacity
pub const DEFAULT_LOG_CAPACITY: usize = 1_000;

pub struct ViolationLog {
    entries: VecDeque<ViolationEntry>,
    capacity: usize,
    total: u64,
}

impl ViolationLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
            capacity,
            total: 0,
        }
    }

    pub fn push(&mut self, entry: ViolationEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.total += 1;
    }

    /// Last `limit` entries, oldest first
    pub fn recent(&self, limit: usize) -> Vec<ViolationEntry> {
        let start = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ever recorded, including evicted ones
    pub fn total(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::model::ModelCategory;
    use crate::logic::safety::SafetyLevel;
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(seq: u64) -> ViolationEntry {
        ViolationEntry {
            id: Uuid::new_v4(),
            seq,
            timestamp: Utc::now(),
            model_id: "m".to_string(),
            category: ModelCategory::Risk,
            level: SafetyLevel::Safe,
            violations: vec![],
            warnings: vec![],
            fallback_applied: false,
            rejected_output: None,
        }
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut log = ViolationLog::new(3);
        for seq in 0..5 {
            log.push(entry(seq));
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.total(), 5);
        let seqs: Vec<u64> = log.recent(10).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        let last: Vec<u64> = log.recent(2).iter().map(|e| e.seq).collect();
        assert_eq!(last, vec![3, 4]);
    }
}
