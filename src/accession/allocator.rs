use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::accession::retry::RetryPolicy;
use crate::accession::AccessionError;
use crate::core::block::{AccessionBlock, BlockState};
use crate::core::types::Category;
use crate::store::{Document, RecordStore, StoreError};

/// Progress of a block to be made durable by a later stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCheckpoint {
    pub block_id: String,
    pub category: Category,
    /// Every number below this has been drawn and its record written
    pub next_free: u64,
}

impl BlockCheckpoint {
    #[must_use]
    pub fn of(block: &AccessionBlock) -> Self {
        Self {
            block_id: block.id(),
            category: block.category,
            next_free: block.next_free,
        }
    }
}

/// Reserves disjoint accession ranges from the shared per-category counter
#[derive(Debug, Clone)]
pub struct BlockAllocator<S> {
    store: S,
    policy: RetryPolicy,
    first_accession: BTreeMap<Category, u64>,
}

impl<S: RecordStore> BlockAllocator<S> {
    pub fn new(store: S, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            first_accession: BTreeMap::new(),
        }
    }

    /// Override where a fresh counter starts for a category
    #[must_use]
    pub fn with_first_accession(mut self, category: Category, first: u64) -> Self {
        self.first_accession.insert(category, first);
        self
    }

    fn initial_value(&self, category: Category) -> u64 {
        self.first_accession
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_first_accession())
    }

    /// Reserve `[start, start + size)` for `instance_id`.
    ///
    /// The counter is advanced with a single atomic increment. Contention is
    /// retried with the configured backoff; other store errors are returned
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns `AccessionError::AllocationExhausted` when the retry budget is
    /// spent, `AccessionError::InvalidBlockSize` for a zero size, or the
    /// underlying `StoreError`.
    pub fn reserve_block(
        &self,
        category: Category,
        instance_id: &str,
        job_run_id: &str,
        size: u64,
    ) -> Result<AccessionBlock, AccessionError> {
        if size == 0 {
            return Err(AccessionError::InvalidBlockSize);
        }

        let started = Instant::now();
        let mut attempt: u32 = 0;
        let start = loop {
            attempt += 1;
            match self.store.increment_counter(
                category.counter_name(),
                self.initial_value(category),
                size,
            ) {
                Ok(previous) => break previous,
                Err(StoreError::Contention(counter)) => {
                    let jitter = rand::random::<f64>();
                    match self.policy.next_delay(attempt, started.elapsed(), jitter) {
                        Some(delay) => {
                            debug!(
                                "Counter {} contended (attempt {}), retrying in {:?}",
                                counter, attempt, delay
                            );
                            std::thread::sleep(delay);
                        }
                        None => {
                            warn!(
                                "Giving up on {} block for {} after {} attempts",
                                category, instance_id, attempt
                            );
                            return Err(AccessionError::AllocationExhausted {
                                category,
                                attempts: attempt,
                            });
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        let block = AccessionBlock::new(category, instance_id, job_run_id, start, size);
        self.store.insert(&block)?;
        info!(
            "Reserved {} block [{}, {}) for instance {}",
            category, block.start, block.end, instance_id
        );
        Ok(block)
    }

    /// Persist a checkpoint; the durable cursor only ever moves forward.
    ///
    /// # Errors
    ///
    /// Returns `AccessionError::BlockReclaimed` if recovery already retired the
    /// block, or a `StoreError` if it cannot be read or written.
    pub fn commit(&self, checkpoint: &BlockCheckpoint) -> Result<AccessionBlock, AccessionError> {
        let mut stored: AccessionBlock =
            self.store
                .get(&checkpoint.block_id)?
                .ok_or_else(|| StoreError::NotFound {
                    collection: AccessionBlock::COLLECTION,
                    key: checkpoint.block_id.clone(),
                })?;

        if stored.state == BlockState::Recovered {
            return Err(AccessionError::BlockReclaimed(checkpoint.block_id.clone()));
        }
        if checkpoint.next_free <= stored.last_committed {
            return Ok(stored);
        }

        let cursor = checkpoint.next_free.min(stored.end);
        stored.last_committed = cursor;
        stored.next_free = stored.next_free.max(cursor);
        if stored.last_committed >= stored.end {
            stored.state = BlockState::Committed;
        }
        stored.last_updated_at = Utc::now();
        self.store.replace(&stored)?;
        debug!(
            "Committed block {} up to {} ({} remaining)",
            stored.id(),
            stored.last_committed,
            stored.end - stored.last_committed
        );
        Ok(stored)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BulkInsertReport, Filter, MemoryStore};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Store whose counter reports contention a fixed number of times
    struct ContendedStore {
        inner: MemoryStore,
        failures_left: AtomicU32,
    }

    impl ContendedStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures_left: AtomicU32::new(failures),
            }
        }
    }

    impl RecordStore for ContendedStore {
        fn increment_counter(&self, name: &str, initial: u64, by: u64) -> Result<u64, StoreError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Contention(name.to_string()));
            }
            self.inner.increment_counter(name, initial, by)
        }
        fn insert<D: Document>(&self, document: &D) -> Result<(), StoreError> {
            self.inner.insert(document)
        }
        fn bulk_insert<D: Document>(&self, documents: &[D]) -> Result<BulkInsertReport, StoreError> {
            self.inner.bulk_insert(documents)
        }
        fn replace<D: Document>(&self, document: &D) -> Result<(), StoreError> {
            self.inner.replace(document)
        }
        fn get<D: Document>(&self, key: &str) -> Result<Option<D>, StoreError> {
            self.inner.get(key)
        }
        fn find<D: Document>(&self, filter: &Filter) -> Result<Vec<D>, StoreError> {
            self.inner.find(filter)
        }
        fn find_one_by_unique<D: Document>(
            &self,
            index: &str,
            value: &str,
        ) -> Result<Option<D>, StoreError> {
            self.inner.find_one_by_unique(index, value)
        }
    }

    #[test]
    fn test_blocks_are_disjoint_and_ordered() {
        let allocator = BlockAllocator::new(Arc::new(MemoryStore::new()), RetryPolicy::default())
            .with_first_accession(Category::Ss, 1);

        let a = allocator.reserve_block(Category::Ss, "w1", "run", 10).unwrap();
        let b = allocator.reserve_block(Category::Ss, "w2", "run", 10).unwrap();
        assert_eq!((a.start, a.end), (1, 11));
        assert_eq!((b.start, b.end), (11, 21));

        // Categories have independent counters
        let rs = allocator.reserve_block(Category::Rs, "w1", "run", 10).unwrap();
        assert_eq!(rs.start, Category::Rs.default_first_accession());
    }

    #[test]
    fn test_concurrent_reservations_never_overlap() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let allocator =
                    BlockAllocator::new(Arc::clone(&store), RetryPolicy::default());
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| {
                            allocator
                                .reserve_block(Category::Ss, &format!("w{i}"), "run", 7)
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ranges: Vec<(u64, u64)> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .map(|b| (b.start, b.end))
            .collect();
        ranges.sort_unstable();
        assert_eq!(ranges.len(), 200);
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "overlap: {pair:?}");
        }
    }

    #[test]
    fn test_contention_is_retried() {
        let allocator = BlockAllocator::new(ContendedStore::new(3), RetryPolicy::immediate(5));
        let block = allocator.reserve_block(Category::Ss, "w1", "run", 5).unwrap();
        assert_eq!(block.start, Category::Ss.default_first_accession());
    }

    #[test]
    fn test_contention_exhausts_budget() {
        let allocator = BlockAllocator::new(ContendedStore::new(10), RetryPolicy::immediate(3));
        let err = allocator
            .reserve_block(Category::Ss, "w1", "run", 5)
            .unwrap_err();
        assert!(matches!(
            err,
            AccessionError::AllocationExhausted { attempts: 3, .. }
        ));
        assert!(err.is_record_scoped());
    }

    #[test]
    fn test_commit_never_regresses() {
        let allocator = BlockAllocator::new(Arc::new(MemoryStore::new()), RetryPolicy::default());
        let mut block = allocator.reserve_block(Category::Ss, "w1", "run", 5).unwrap();
        block.draw();
        block.draw();
        let ahead = BlockCheckpoint::of(&block);
        let committed = allocator.commit(&ahead).unwrap();
        assert_eq!(committed.last_committed, block.start + 2);

        let behind = BlockCheckpoint {
            next_free: block.start + 1,
            ..ahead
        };
        let committed = allocator.commit(&behind).unwrap();
        assert_eq!(committed.last_committed, block.start + 2);
        assert_eq!(committed.state, BlockState::Open);

        while block.draw().is_some() {}
        let committed = allocator.commit(&BlockCheckpoint::of(&block)).unwrap();
        assert_eq!(committed.state, BlockState::Committed);
    }

    #[test]
    fn test_zero_size_rejected() {
        let allocator = BlockAllocator::new(Arc::new(MemoryStore::new()), RetryPolicy::default());
        assert!(matches!(
            allocator.reserve_block(Category::Ss, "w1", "run", 0),
            Err(AccessionError::InvalidBlockSize)
        ));
    }
}
