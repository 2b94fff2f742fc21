use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::clustering::ClusteringEngine;
use crate::core::block::{AccessionBlock, BlockState, RetiredRange};
use crate::core::types::Category;
use crate::core::variant::{accession_key, ClusteredVariant, SubmittedVariant};
use crate::recovery::RecoveryError;
use crate::store::{Filter, RecordStore};

/// What a recovery run reclaimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub category: Category,
    pub blocks_recovered: usize,
    /// Rows found past a block's durable cursor
    pub committed_found: u64,
    pub retired: Vec<RetiredRange>,
    /// Submitted variants found without a cluster and clustered now
    pub reclustered: u64,
    /// Submitted variants that still could not be clustered
    pub recluster_failures: u64,
}

impl RecoveryReport {
    fn new(category: Category) -> Self {
        Self {
            category,
            blocks_recovered: 0,
            committed_found: 0,
            retired: Vec::new(),
            reclustered: 0,
            recluster_failures: 0,
        }
    }

    /// Total numbers permanently retired
    #[must_use]
    pub fn retired_numbers(&self) -> u64 {
        self.retired.iter().map(RetiredRange::len).sum()
    }
}

/// `now - days`, saturating at the earliest representable time
#[must_use]
pub fn cutoff_from_days(days: u64) -> DateTime<Utc> {
    let now = Utc::now();
    i64::try_from(days)
        .ok()
        .and_then(chrono::Duration::try_days)
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Reclaims blocks abandoned by crashed or interrupted instances.
///
/// For every candidate block, the numbers between its durable cursor and its
/// end are checked one by one: numbers backing a row are kept, runs of
/// numbers without a row are retired, and the block is marked RECOVERED so
/// nothing in it is handed out again.
pub struct RecoveryAgent<S> {
    store: S,
    clustering: ClusteringEngine<S>,
    /// Instances being restarted; their blocks in the same run skip the cutoff
    restarting: HashSet<String>,
}

impl<S: RecordStore + Clone> RecoveryAgent<S> {
    /// `clustering` re-drives submitted variants that were accessioned but
    /// never clustered before the crash.
    pub fn new(store: S, clustering: ClusteringEngine<S>) -> Self {
        Self {
            store,
            clustering,
            restarting: HashSet::new(),
        }
    }

    /// Declare the instances this agent restarts.
    ///
    /// Their blocks tagged with the recovered job run are reclaimed whatever
    /// their age. Blocks of any other instance, including peers of the same
    /// run, are only reclaimed once stale.
    #[must_use]
    pub fn restarting<I, T>(mut self, instances: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.restarting = instances.into_iter().map(Into::into).collect();
        self
    }

    /// Blocks with unaccounted numbers, stale since `cutoff` or left by a
    /// restarting instance of `job_run_id`
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn candidates(
        &self,
        category: Category,
        job_run_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<AccessionBlock>, RecoveryError> {
        let blocks: Vec<AccessionBlock> =
            self.store.find(&Filter::new().eq("category", category))?;
        Ok(blocks
            .into_iter()
            .filter(|block| {
                block.has_uncommitted()
                    && (block.last_updated_at <= cutoff
                        || (block.job_run_id == job_run_id
                            && self.restarting.contains(&block.instance_id)))
            })
            .collect())
    }

    /// Recover every candidate block of `category`.
    ///
    /// Running it again with the same arguments finds nothing left to do.
    ///
    /// # Errors
    ///
    /// Returns store errors, or clustering errors that are not specific to a
    /// single record.
    pub fn run_recovery(
        &mut self,
        category: Category,
        job_run_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<RecoveryReport, RecoveryError> {
        let mut report = RecoveryReport::new(category);
        let candidates = self.candidates(category, job_run_id, cutoff)?;
        if candidates.is_empty() {
            debug!("No {} blocks to recover", category);
            return Ok(report);
        }

        for block in candidates {
            self.recover_block(block, job_run_id, &mut report)?;
        }
        self.clustering.generator_mut().commit()?;

        info!(
            "Recovered {} {} block(s): {} row(s) found, {} number(s) retired in {} range(s), {} re-clustered",
            report.blocks_recovered,
            category,
            report.committed_found,
            report.retired_numbers(),
            report.retired.len(),
            report.reclustered
        );
        Ok(report)
    }

    fn recover_block(
        &mut self,
        mut block: AccessionBlock,
        job_run_id: &str,
        report: &mut RecoveryReport,
    ) -> Result<(), RecoveryError> {
        let mut retired = Vec::new();
        let mut gap_start: Option<u64> = None;

        for accession in block.last_committed..block.end {
            let found = match block.category {
                Category::Ss => {
                    let row: Option<SubmittedVariant> = self
                        .store
                        .find_one_by_unique("accession", &accession.to_string())?;
                    if let Some(ss) = &row {
                        self.recluster(ss, report)?;
                    }
                    row.is_some()
                }
                Category::Rs => self
                    .store
                    .get::<ClusteredVariant>(&accession_key(accession))?
                    .is_some(),
            };

            if found {
                report.committed_found += 1;
                if let Some(start) = gap_start.take() {
                    retired.push(retire(&block, start, accession, job_run_id));
                }
            } else {
                gap_start.get_or_insert(accession);
            }
        }
        if let Some(start) = gap_start {
            retired.push(retire(&block, start, block.end, job_run_id));
        }

        if !retired.is_empty() {
            let inserted = self.store.bulk_insert(&retired)?;
            for duplicate in &inserted.duplicates {
                warn!("Retired range {} was already recorded", duplicate);
            }
        }

        for range in &retired {
            debug!(
                "Retired {} [{}, {}) from block {}",
                range.category, range.start, range.end, range.block_id
            );
        }
        block.state = BlockState::Recovered;
        block.last_committed = block.end;
        block.next_free = block.end;
        block.last_updated_at = Utc::now();
        self.store.replace(&block)?;

        report.blocks_recovered += 1;
        report.retired.extend(retired);
        Ok(())
    }

    fn recluster(
        &mut self,
        ss: &SubmittedVariant,
        report: &mut RecoveryReport,
    ) -> Result<(), RecoveryError> {
        if ss.clustered_variant_accession.is_some() || !ss.is_active() {
            return Ok(());
        }
        match self.clustering.cluster(ss) {
            Ok(rs) => {
                debug!("Re-clustered ss{} into rs{}", ss.accession, rs);
                report.reclustered += 1;
                Ok(())
            }
            Err(e) if e.is_record_scoped() => {
                warn!("Could not cluster ss{}: {}", ss.accession, e);
                report.recluster_failures += 1;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn retire(block: &AccessionBlock, start: u64, end: u64, job_run_id: &str) -> RetiredRange {
    RetiredRange {
        category: block.category,
        start,
        end,
        block_id: block.id(),
        job_run_id: job_run_id.to_string(),
        retired_at: Utc::now(),
    }
}
