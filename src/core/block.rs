use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::Category;
use crate::core::variant::accession_key;
use crate::store::Document;

/// Lifecycle of a reserved block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockState {
    /// Owned by a live instance, numbers may still be drawn
    Open,
    /// Every number was drawn and committed
    Committed,
    /// Reclaimed by the recovery agent; never handed out again
    Recovered,
}

/// A contiguous range `[start, end)` of accessions owned by one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessionBlock {
    pub category: Category,
    pub instance_id: String,
    pub job_run_id: String,
    pub start: u64,
    /// Exclusive
    pub end: u64,
    /// Next number to draw (in-process cursor)
    pub next_free: u64,
    /// Every number below this is a committed row or retired
    pub last_committed: u64,
    pub state: BlockState,
    pub reserved_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl AccessionBlock {
    #[must_use]
    pub fn new(
        category: Category,
        instance_id: impl Into<String>,
        job_run_id: impl Into<String>,
        start: u64,
        size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            category,
            instance_id: instance_id.into(),
            job_run_id: job_run_id.into(),
            start,
            end: start.saturating_add(size),
            next_free: start,
            last_committed: start,
            state: BlockState::Open,
            reserved_at: now,
            last_updated_at: now,
        }
    }

    #[must_use]
    pub fn id(&self) -> String {
        block_key(self.category, self.start)
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.next_free >= self.end
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.next_free)
    }

    /// Take the next number, if any remain
    pub fn draw(&mut self) -> Option<u64> {
        if self.is_exhausted() {
            return None;
        }
        let accession = self.next_free;
        self.next_free += 1;
        Some(accession)
    }

    #[must_use]
    pub fn contains(&self, accession: u64) -> bool {
        (self.start..self.end).contains(&accession)
    }

    /// Whether numbers between `last_committed` and `end` are unaccounted for
    #[must_use]
    pub fn has_uncommitted(&self) -> bool {
        self.last_committed < self.end && self.state != BlockState::Recovered
    }
}

pub(crate) fn block_key(category: Category, start: u64) -> String {
    format!("{category}-{}", accession_key(start))
}

impl Document for AccessionBlock {
    const COLLECTION: &'static str = "accession_blocks";
    const INDEXED_FIELDS: &'static [&'static str] = &["category"];

    fn key(&self) -> String {
        self.id()
    }
}

/// Numbers `[start, end)` retired by recovery: never issued, never reissued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetiredRange {
    pub category: Category,
    pub start: u64,
    pub end: u64,
    pub block_id: String,
    /// Run that performed the recovery
    pub job_run_id: String,
    pub retired_at: DateTime<Utc>,
}

impl RetiredRange {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl Document for RetiredRange {
    const COLLECTION: &'static str = "retired_ranges";
    const INDEXED_FIELDS: &'static [&'static str] = &["category"];

    fn key(&self) -> String {
        block_key(self.category, self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_until_exhausted() {
        let mut block = AccessionBlock::new(Category::Ss, "w1", "run1", 10, 3);
        assert_eq!(block.draw(), Some(10));
        assert_eq!(block.draw(), Some(11));
        assert_eq!(block.remaining(), 1);
        assert_eq!(block.draw(), Some(12));
        assert!(block.is_exhausted());
        assert_eq!(block.draw(), None);
        assert_eq!(block.next_free, 13);
    }

    #[test]
    fn test_block_id_is_category_scoped() {
        let ss = AccessionBlock::new(Category::Ss, "w1", "run1", 10, 3);
        let rs = AccessionBlock::new(Category::Rs, "w1", "run1", 10, 3);
        assert_ne!(ss.id(), rs.id());
        assert!(ss.has_uncommitted());
        assert!(ss.contains(12));
        assert!(!ss.contains(13));
    }
}
