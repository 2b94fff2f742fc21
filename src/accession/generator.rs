use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::accession::allocator::{BlockAllocator, BlockCheckpoint};
use crate::accession::hasher::submitted_variant_fingerprint;
use crate::accession::retry::RetryPolicy;
use crate::accession::AccessionError;
use crate::core::block::AccessionBlock;
use crate::core::types::{Archive, Category};
use crate::core::variant::{SubmittedVariant, VariantSubmission};
use crate::store::{Document, RecordStore, StoreError};
use crate::utils::validation::validate_submission;

/// Whether a lookup produced a new record or found an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessionOutcome {
    New,
    Existing,
}

/// Who is drawing accessions, and in what quantities
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub instance_id: String,
    pub job_run_id: String,
    pub block_size: u64,
    pub retry: RetryPolicy,
    /// First accession of a fresh counter (defaults per category)
    pub first_accession: Option<u64>,
}

impl GeneratorSettings {
    pub fn new(instance_id: impl Into<String>, job_run_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            job_run_id: job_run_id.into(),
            block_size: 1000,
            retry: RetryPolicy::default(),
            first_accession: None,
        }
    }

    #[must_use]
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    #[must_use]
    pub fn with_first_accession(mut self, first: u64) -> Self {
        self.first_accession = Some(first);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Draws accessions of one category for one instance.
///
/// The generator exclusively owns its open block. Finished blocks are kept as
/// pending checkpoints until [`take_checkpoints`](Self::take_checkpoints) hands
/// them to whoever commits the chunk.
#[derive(Debug)]
pub struct AccessionGenerator<S> {
    store: S,
    allocator: BlockAllocator<S>,
    category: Category,
    settings: GeneratorSettings,
    block: Option<AccessionBlock>,
    pending: Vec<BlockCheckpoint>,
    skipped: u64,
}

impl<S: RecordStore + Clone> AccessionGenerator<S> {
    pub fn new(store: S, category: Category, settings: GeneratorSettings) -> Self {
        let mut allocator = BlockAllocator::new(store.clone(), settings.retry.clone());
        if let Some(first) = settings.first_accession {
            allocator = allocator.with_first_accession(category, first);
        }
        Self {
            store,
            allocator,
            category,
            settings,
            block: None,
            pending: Vec::new(),
            skipped: 0,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn instance_id(&self) -> &str {
        &self.settings.instance_id
    }

    /// Numbers drawn but discarded because another instance won the insert
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn allocator(&self) -> &BlockAllocator<S> {
        &self.allocator
    }

    /// Draw the next accession, reserving a new block when needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a new block cannot be reserved.
    pub fn next_accession(&mut self) -> Result<u64, AccessionError> {
        if let Some(accession) = self.block.as_mut().and_then(AccessionBlock::draw) {
            return Ok(accession);
        }

        if let Some(finished) = self.block.take() {
            self.pending.push(BlockCheckpoint::of(&finished));
        }
        let mut block = self.allocator.reserve_block(
            self.category,
            &self.settings.instance_id,
            &self.settings.job_run_id,
            self.settings.block_size,
        )?;
        let accession = block.draw().ok_or(AccessionError::InvalidBlockSize)?;
        self.block = Some(block);
        Ok(accession)
    }

    /// Draw an accession and try to insert a record with it.
    ///
    /// `insert` builds and writes the record. If the store rejects it on
    /// `dedup_index`, the drawn number is abandoned and `resolve` loads the
    /// record that won, given its primary key. A conflict on any other index
    /// means the accession itself was already taken, which is an invariant
    /// violation.
    ///
    /// # Errors
    ///
    /// Returns allocation errors, `AccessionError::AccessionCollision`, or
    /// store errors other than the tolerated duplicate.
    pub fn insert_or_resolve<T, F, R>(
        &mut self,
        dedup_index: &str,
        insert: F,
        resolve: R,
    ) -> Result<(T, AccessionOutcome), AccessionError>
    where
        F: FnOnce(u64) -> Result<T, StoreError>,
        R: FnOnce(&str) -> Result<Option<T>, StoreError>,
    {
        let accession = self.next_accession()?;
        match insert(accession) {
            Ok(record) => Ok((record, AccessionOutcome::New)),
            Err(StoreError::DuplicateKey {
                collection,
                index,
                existing_key,
                ..
            }) if index == dedup_index => {
                self.skipped += 1;
                debug!(
                    "{} {} skipped: {} already holds the record in {}",
                    self.category, accession, existing_key, collection
                );
                let existing = resolve(&existing_key)?.ok_or(AccessionError::MissingExisting {
                    collection,
                    key: existing_key,
                })?;
                Ok((existing, AccessionOutcome::Existing))
            }
            Err(StoreError::DuplicateKey { .. }) => Err(AccessionError::AccessionCollision {
                category: self.category,
                accession,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a submission to its submitted variant, creating it on first sight.
    ///
    /// # Errors
    ///
    /// Returns `AccessionError::Validation` for invalid submissions, or any
    /// allocation/store failure.
    pub fn get_or_create(
        &mut self,
        submission: &VariantSubmission,
        archive: Archive,
    ) -> Result<(SubmittedVariant, AccessionOutcome), AccessionError> {
        self.get_or_create_with(submission, archive, |_| {})
    }

    /// Like [`get_or_create`](Self::get_or_create), letting `decorate` fill in
    /// non-identity fields of a record that is about to be created.
    ///
    /// # Errors
    ///
    /// Same as [`get_or_create`](Self::get_or_create).
    pub fn get_or_create_with<D>(
        &mut self,
        submission: &VariantSubmission,
        archive: Archive,
        decorate: D,
    ) -> Result<(SubmittedVariant, AccessionOutcome), AccessionError>
    where
        D: FnOnce(&mut SubmittedVariant),
    {
        validate_submission(submission)?;
        let hash = submitted_variant_fingerprint(submission);

        if let Some(existing) = self.store.get::<SubmittedVariant>(&hash)? {
            return Ok((existing, AccessionOutcome::Existing));
        }

        let store = self.store.clone();
        let lookup = self.store.clone();
        let key = hash.clone();
        self.insert_or_resolve(
            "_id",
            move |accession| {
                let mut record =
                    SubmittedVariant::from_submission(submission, hash, accession, archive);
                decorate(&mut record);
                store.insert(&record)?;
                Ok(record)
            },
            move |_| lookup.get::<SubmittedVariant>(&key),
        )
    }

    /// Checkpoints of every block touched since the last call
    pub fn take_checkpoints(&mut self) -> Vec<BlockCheckpoint> {
        let mut checkpoints = std::mem::take(&mut self.pending);
        if let Some(block) = &self.block {
            checkpoints.push(BlockCheckpoint::of(block));
        }
        checkpoints
    }

    /// Commit every outstanding checkpoint directly
    ///
    /// # Errors
    ///
    /// Returns the first commit failure.
    pub fn commit(&mut self) -> Result<(), AccessionError> {
        for checkpoint in self.take_checkpoints() {
            self.allocator.commit(&checkpoint)?;
        }
        Ok(())
    }
}

/// Collection holding the records of a category
#[must_use]
pub fn collection_for(category: Category) -> &'static str {
    match category {
        Category::Ss => SubmittedVariant::COLLECTION,
        Category::Rs => crate::core::variant::ClusteredVariant::COLLECTION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::BlockState;
    use crate::store::{Filter, MemoryStore};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn settings(instance: &str) -> GeneratorSettings {
        GeneratorSettings::new(instance, "run1")
            .with_block_size(3)
            .with_first_accession(1)
    }

    fn submission(start: u64) -> VariantSubmission {
        VariantSubmission::new("GCA_1", "PRJ1", "1", start, "A", "T")
    }

    #[test]
    fn test_same_variant_gets_same_accession() {
        let store = Arc::new(MemoryStore::new());
        let mut generator = AccessionGenerator::new(Arc::clone(&store), Category::Ss, settings("w1"));

        let (first, outcome) = generator.get_or_create(&submission(100), Archive::Eva).unwrap();
        assert_eq!(outcome, AccessionOutcome::New);
        let (second, outcome) = generator.get_or_create(&submission(100), Archive::Eva).unwrap();
        assert_eq!(outcome, AccessionOutcome::Existing);
        assert_eq!(first.accession, second.accession);
        assert_eq!(store.count::<SubmittedVariant>().unwrap(), 1);
    }

    #[test]
    fn test_accessions_increase_across_blocks() {
        let store = Arc::new(MemoryStore::new());
        let mut generator = AccessionGenerator::new(Arc::clone(&store), Category::Ss, settings("w1"));

        let accessions: Vec<u64> = (1..=7)
            .map(|start| generator.get_or_create(&submission(start), Archive::Eva).unwrap().0.accession)
            .collect();
        assert_eq!(accessions, vec![1, 2, 3, 4, 5, 6, 7]);

        let checkpoints = generator.take_checkpoints();
        assert_eq!(checkpoints.len(), 3);
        generator.commit().unwrap();
        for checkpoint in &checkpoints {
            generator.allocator().commit(checkpoint).unwrap();
        }
        let blocks: Vec<AccessionBlock> = store.find(&Filter::new()).unwrap();
        assert_eq!(blocks[0].state, BlockState::Committed);
        assert_eq!(blocks[2].last_committed, 8);
    }

    #[test]
    fn test_invalid_submission_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut generator = AccessionGenerator::new(Arc::clone(&store), Category::Ss, settings("w1"));
        let bad = VariantSubmission::new("GCA_1", "PRJ1", "1", 100, "A", "Z");
        let err = generator.get_or_create(&bad, Archive::Eva).unwrap_err();
        assert!(err.is_record_scoped());
        // No number was drawn for the rejected record
        assert!(generator.take_checkpoints().is_empty());
    }

    #[test]
    fn test_racing_insert_falls_back_to_existing() {
        let store = Arc::new(MemoryStore::new());
        let mut slow = AccessionGenerator::new(Arc::clone(&store), Category::Ss, settings("slow"));
        let mut fast = AccessionGenerator::new(Arc::clone(&store), Category::Ss, settings("fast"));

        let (winner, _) = fast.get_or_create(&submission(100), Archive::Eva).unwrap();

        // Simulate the slow instance having missed the record in its lookup
        let hash = winner.hash.clone();
        let insert_store = Arc::clone(&store);
        let lookup_store = Arc::clone(&store);
        let (loser, outcome) = slow
            .insert_or_resolve(
                "_id",
                |accession| {
                    let record = SubmittedVariant::from_submission(
                        &submission(100),
                        hash.clone(),
                        accession,
                        Archive::Eva,
                    );
                    insert_store.insert(&record)?;
                    Ok(record)
                },
                |key| lookup_store.get::<SubmittedVariant>(key),
            )
            .unwrap();

        assert_eq!(outcome, AccessionOutcome::Existing);
        assert_eq!(loser.accession, winner.accession);
        assert_eq!(slow.skipped(), 1);
        assert_eq!(store.count::<SubmittedVariant>().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_workers_agree_on_accession() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut generator = AccessionGenerator::new(
                        store,
                        Category::Ss,
                        GeneratorSettings::new(format!("w{i}"), "run1").with_block_size(10),
                    );
                    (0..50)
                        .map(|start| {
                            let (record, _) = generator
                                .get_or_create(&submission(start + 1), Archive::Eva)
                                .unwrap();
                            (record.hash, record.accession)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<(String, u64)>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &results[1..] {
            assert_eq!(&results[0], other);
        }

        let accessions: HashSet<u64> = results[0].iter().map(|(_, a)| *a).collect();
        assert_eq!(accessions.len(), 50);
        assert_eq!(store.count::<SubmittedVariant>().unwrap(), 50);
    }
}
