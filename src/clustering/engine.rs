use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::accession::{AccessionGenerator, AccessionOutcome, BlockCheckpoint, GeneratorSettings};
use crate::clustering::key::{ClusteringKey, KeyDeriver};
use crate::clustering::ClusteringError;
use crate::core::event::{EventKind, OperationEvent};
use crate::core::types::{Category, ClusterStatus};
use crate::core::variant::{accession_key, ClusteredVariant, SubmittedVariant};
use crate::store::{Filter, RecordStore, StoreError};

/// Longest `merged_into` chain followed before giving up
pub const MAX_MERGE_CHAIN: usize = 64;

/// Counts of clustering mutations since the last [`ClusteringEngine::take_stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusteringStats {
    /// New clusters created
    pub created: u64,
    /// Submitted variants whose back-reference was set or changed
    pub attached: u64,
    /// Clusters merged into another
    pub merged: u64,
    /// Split operations (one per target cluster)
    pub split: u64,
    /// Clusters whose stored key was corrected in place
    pub rekeyed: u64,
}

impl ClusteringStats {
    pub fn absorb(&mut self, other: ClusteringStats) {
        self.created += other.created;
        self.attached += other.attached;
        self.merged += other.merged;
        self.split += other.split;
        self.rekeyed += other.rekeyed;
    }
}

/// What a re-keying pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RekeyReport {
    /// Clusters merged away because their corrected keys collided
    pub merged: Vec<u64>,
    /// Clusters whose stored key changed
    pub rekeyed: Vec<u64>,
    /// Clusters that received members split off another cluster
    pub split_into: Vec<u64>,
}

/// Groups submitted variants into clustered variants and maintains the
/// cluster graph (merge, split, re-key).
///
/// Each engine owns an `rs` accession generator, so one engine must not be
/// shared between workers.
pub struct ClusteringEngine<S> {
    store: S,
    generator: AccessionGenerator<S>,
    keys: Arc<KeyDeriver>,
    stats: ClusteringStats,
}

impl<S: RecordStore + Clone> ClusteringEngine<S> {
    pub fn new(store: S, settings: GeneratorSettings, keys: Arc<KeyDeriver>) -> Self {
        let generator = AccessionGenerator::new(store.clone(), Category::Rs, settings);
        Self {
            store,
            generator,
            keys,
            stats: ClusteringStats::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn keys(&self) -> &KeyDeriver {
        &self.keys
    }

    pub fn stats(&self) -> ClusteringStats {
        self.stats
    }

    pub fn take_stats(&mut self) -> ClusteringStats {
        std::mem::take(&mut self.stats)
    }

    /// Block checkpoints of the `rs` generator
    pub fn take_checkpoints(&mut self) -> Vec<BlockCheckpoint> {
        self.generator.take_checkpoints()
    }

    pub fn generator_mut(&mut self) -> &mut AccessionGenerator<S> {
        &mut self.generator
    }

    /// Fetch a cluster by accession
    ///
    /// # Errors
    ///
    /// Returns `ClusteringError::NotFound` if no such cluster exists.
    pub fn get_cluster(&self, accession: u64) -> Result<ClusteredVariant, ClusteringError> {
        self.store
            .get(&accession_key(accession))?
            .ok_or(ClusteringError::NotFound {
                category: Category::Rs,
                accession,
            })
    }

    /// Fetch a submitted variant by accession
    ///
    /// # Errors
    ///
    /// Returns `ClusteringError::NotFound` if no such submitted variant exists.
    pub fn submitted_by_accession(
        &self,
        accession: u64,
    ) -> Result<SubmittedVariant, ClusteringError> {
        self.store
            .find_one_by_unique("accession", &accession.to_string())?
            .ok_or(ClusteringError::NotFound {
                category: Category::Ss,
                accession,
            })
    }

    /// Every submitted variant pointing at `rs`, whatever its status
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn members(&self, rs: u64) -> Result<Vec<SubmittedVariant>, ClusteringError> {
        Ok(self
            .store
            .find(&Filter::new().eq("clustered_variant_accession", rs))?)
    }

    /// ACTIVE submitted variants pointing at `rs`
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn active_members(&self, rs: u64) -> Result<Vec<SubmittedVariant>, ClusteringError> {
        Ok(self
            .members(rs)?
            .into_iter()
            .filter(SubmittedVariant::is_active)
            .collect())
    }

    /// ACTIVE clusters of an assembly, in accession order
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn active_clusters(&self, assembly: &str) -> Result<Vec<ClusteredVariant>, ClusteringError> {
        Ok(self.store.find(
            &Filter::new()
                .eq("assembly_accession", assembly)
                .eq("status", ClusterStatus::Active),
        )?)
    }

    fn find_active(&self, hash: &str) -> Result<Option<ClusteredVariant>, StoreError> {
        self.store.find_one_by_unique("active_key", hash)
    }

    /// Key hash a cluster would carry under the current synonym tables
    fn derived_hash(&self, cluster: &ClusteredVariant) -> Option<String> {
        self.keys.for_cluster(cluster).ok().map(|key| key.hash())
    }

    pub(crate) fn record(&self, event: OperationEvent) -> Result<(), StoreError> {
        debug!(
            "{} {}{}",
            event.kind.name(),
            event.category,
            event.accession
        );
        self.store.insert(&event)
    }

    /// Assign a submitted variant to the ACTIVE cluster of its clustering key.
    ///
    /// Creates the cluster when none exists. A submitted variant already
    /// attached to the right cluster is left untouched. If its previous cluster
    /// turns out to share the key with the one found, the two are merged; if
    /// its key moved away from the previous cluster, that move is recorded as
    /// a split.
    ///
    /// # Errors
    ///
    /// Returns `ClusteringError::InactiveSubmission` for deprecated records,
    /// validation errors for unknown contigs, and allocation or store errors.
    pub fn cluster(&mut self, submitted: &SubmittedVariant) -> Result<u64, ClusteringError> {
        let current: SubmittedVariant = self.store.get(&submitted.hash)?.ok_or(
            ClusteringError::NotFound {
                category: Category::Ss,
                accession: submitted.accession,
            },
        )?;
        if !current.is_active() {
            return Err(ClusteringError::InactiveSubmission(current.accession));
        }

        let key = self.keys.for_submitted(&current)?;
        let hash = key.hash();

        let target = match self.find_active(&hash)? {
            Some(cluster) => cluster.accession,
            None => match self.stale_cluster_for(current.clustered_variant_accession, &hash)? {
                Some(cluster) => {
                    self.rekey_cluster(&cluster, &key)?;
                    cluster.accession
                }
                None => self.create_cluster(&key)?,
            },
        };

        let Some(previous) = current.clustered_variant_accession else {
            self.attach(&current, target)?;
            return Ok(target);
        };
        if previous == target {
            return Ok(target);
        }

        let previous = self.get_cluster(previous)?;
        if previous.is_active() && self.derived_hash(&previous).as_deref() == Some(hash.as_str()) {
            let winner = self.merge(previous.accession, target)?;
            let survivor = self.get_cluster(winner)?;
            if survivor.hash != hash {
                self.rekey_cluster(&survivor, &key)?;
            }
            return Ok(winner);
        }

        if previous.is_active() {
            self.record(
                OperationEvent::new(
                    Category::Rs,
                    previous.accession,
                    EventKind::Split { split_into: target },
                )
                .with_reason(format!("clustering key of ss{} changed", current.accession))
                .with_snapshot(&previous),
            )?;
            self.stats.split += 1;
        }
        self.attach(&current, target)?;
        Ok(target)
    }

    /// An ACTIVE cluster whose stored key is out of date but corrects to `hash`
    fn stale_cluster_for(
        &self,
        accession: Option<u64>,
        hash: &str,
    ) -> Result<Option<ClusteredVariant>, ClusteringError> {
        let Some(accession) = accession else {
            return Ok(None);
        };
        let Some(cluster) = self.store.get::<ClusteredVariant>(&accession_key(accession))? else {
            return Ok(None);
        };
        if cluster.is_active() && self.derived_hash(&cluster).as_deref() == Some(hash) {
            Ok(Some(cluster))
        } else {
            Ok(None)
        }
    }

    fn create_cluster(&mut self, key: &ClusteringKey) -> Result<u64, ClusteringError> {
        let store = self.store.clone();
        let lookup = self.store.clone();
        let record_key = key.clone();

        let (cluster, outcome) = self.generator.insert_or_resolve(
            "active_key",
            move |accession| {
                let now = Utc::now();
                let cluster = ClusteredVariant {
                    accession,
                    hash: record_key.hash(),
                    assembly_accession: record_key.assembly_accession,
                    contig: record_key.contig,
                    start: record_key.start,
                    variant_type: record_key.variant_type,
                    status: ClusterStatus::Active,
                    merged_into: None,
                    deprecation_reason: None,
                    created_at: now,
                    last_updated_at: now,
                };
                store.insert(&cluster)?;
                Ok(cluster)
            },
            move |existing| lookup.get::<ClusteredVariant>(existing),
        )?;

        if outcome == AccessionOutcome::New {
            self.record(OperationEvent::new(
                Category::Rs,
                cluster.accession,
                EventKind::Created,
            ))?;
            self.stats.created += 1;
            debug!("Created rs{} for {}", cluster.accession, key);
        }
        Ok(cluster.accession)
    }

    fn attach(&mut self, submitted: &SubmittedVariant, target: u64) -> Result<(), ClusteringError> {
        let mut updated = submitted.clone();
        updated.clustered_variant_accession = Some(target);
        updated.last_updated_at = Utc::now();
        self.store.replace(&updated)?;
        self.record(
            OperationEvent::new(
                Category::Ss,
                submitted.accession,
                EventKind::Updated {
                    clustered_variant_accession: Some(target),
                },
            )
            .with_snapshot(submitted),
        )?;
        self.stats.attached += 1;
        Ok(())
    }

    fn rekey_cluster(
        &mut self,
        cluster: &ClusteredVariant,
        key: &ClusteringKey,
    ) -> Result<(), ClusteringError> {
        let mut updated = cluster.clone();
        updated.hash = key.hash();
        updated.contig = key.contig.clone();
        updated.start = key.start;
        updated.variant_type = key.variant_type;
        updated.last_updated_at = Utc::now();
        self.store.replace(&updated)?;
        self.record(
            OperationEvent::new(
                Category::Rs,
                cluster.accession,
                EventKind::Updated {
                    clustered_variant_accession: None,
                },
            )
            .with_reason(format!("clustering key corrected to {key}"))
            .with_snapshot(cluster),
        )?;
        self.stats.rekeyed += 1;
        info!("Re-keyed rs{} to {}", cluster.accession, key);
        Ok(())
    }

    /// Merge two ACTIVE clusters; the higher accession is merged into the lower.
    ///
    /// Every submitted variant of the merged cluster is repointed at the
    /// survivor. Merging an already merged pair again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ClusteringError::InvalidTransition` if either cluster is not
    /// ACTIVE, `ClusteringError::NotFound` for unknown accessions, or store
    /// errors.
    pub fn merge(&mut self, a: u64, b: u64) -> Result<u64, ClusteringError> {
        let (winner, loser) = (a.min(b), a.max(b));
        let survivor = self.get_cluster(winner)?;
        if winner == loser {
            return Ok(winner);
        }
        let absorbed = self.get_cluster(loser)?;
        if absorbed.status == ClusterStatus::Merged && absorbed.merged_into == Some(winner) {
            return Ok(winner);
        }
        require_active(&survivor, "merge")?;
        require_active(&absorbed, "merge")?;

        let mut merged = absorbed.clone();
        merged.status = ClusterStatus::Merged;
        merged.merged_into = Some(winner);
        merged.last_updated_at = Utc::now();
        self.store.replace(&merged)?;
        self.record(
            OperationEvent::new(
                Category::Rs,
                loser,
                EventKind::Merged {
                    merged_into: winner,
                },
            )
            .with_reason(format!("rs{loser} and rs{winner} share a clustering key"))
            .with_snapshot(&absorbed),
        )?;

        for member in self.members(loser)? {
            self.attach(&member, winner)?;
        }
        self.stats.merged += 1;
        info!("Merged rs{} into rs{}", loser, winner);
        Ok(winner)
    }

    /// Move diverging members of an ACTIVE cluster to the cluster of their own key.
    ///
    /// Members are grouped by clustering key; each group joins the ACTIVE
    /// cluster of that key or a newly created one, never the original. The
    /// original stays ACTIVE. Returns the target accession of every group.
    ///
    /// # Errors
    ///
    /// Returns `ClusteringError::InvalidTransition` for non-ACTIVE clusters,
    /// `ClusteringError::NotAMember` or `ClusteringError::NoDivergence` for
    /// members that cannot be split off. Nothing is changed in those cases.
    pub fn split(
        &mut self,
        rs: u64,
        diverging: &[u64],
        reason: &str,
    ) -> Result<Vec<u64>, ClusteringError> {
        let original = self.get_cluster(rs)?;
        require_active(&original, "split")?;
        let original_derived = self.derived_hash(&original);

        let mut groups: BTreeMap<String, (ClusteringKey, Vec<SubmittedVariant>)> = BTreeMap::new();
        for &ss in diverging {
            let member = self.submitted_by_accession(ss)?;
            if member.clustered_variant_accession != Some(rs) {
                return Err(ClusteringError::NotAMember { ss, rs });
            }
            let key = self.keys.for_submitted(&member)?;
            let hash = key.hash();
            if hash == original.hash || original_derived.as_deref() == Some(hash.as_str()) {
                return Err(ClusteringError::NoDivergence { ss, rs });
            }
            groups
                .entry(hash)
                .or_insert_with(|| (key, Vec::new()))
                .1
                .push(member);
        }

        let mut targets = Vec::with_capacity(groups.len());
        for (hash, (key, members)) in groups {
            let target = match self.find_active(&hash)? {
                Some(cluster) => cluster.accession,
                None => self.create_cluster(&key)?,
            };
            self.record(
                OperationEvent::new(Category::Rs, rs, EventKind::Split { split_into: target })
                    .with_reason(reason)
                    .with_snapshot(&original),
            )?;
            for member in &members {
                self.attach(member, target)?;
            }
            self.stats.split += 1;
            info!(
                "Split {} submitted variant(s) off rs{} into rs{}",
                members.len(),
                rs,
                target
            );
            targets.push(target);
        }
        Ok(targets)
    }

    /// Merge ACTIVE clusters of an assembly that share a clustering key.
    ///
    /// Each group of duplicates is announced with an `RS_MERGE_CANDIDATES`
    /// event on its lowest accession, then merged into it. Returns the
    /// accessions merged away.
    ///
    /// # Errors
    ///
    /// Returns store errors or invalid transitions raised by [`merge`](Self::merge).
    pub fn merge_duplicates(&mut self, assembly: &str) -> Result<Vec<u64>, ClusteringError> {
        let mut groups: BTreeMap<String, (ClusteringKey, Vec<u64>)> = BTreeMap::new();
        for cluster in self.active_clusters(assembly)? {
            match self.keys.for_cluster(&cluster) {
                Ok(key) => groups
                    .entry(key.hash())
                    .or_insert_with(|| (key, Vec::new()))
                    .1
                    .push(cluster.accession),
                Err(e) => warn!("Skipping rs{}: {}", cluster.accession, e),
            }
        }

        let mut merged = Vec::new();
        for (hash, (key, mut accessions)) in groups {
            if accessions.len() < 2 {
                continue;
            }
            accessions.sort_unstable();
            let winner = accessions[0];
            self.record(
                OperationEvent::new(
                    Category::Rs,
                    winner,
                    EventKind::RsMergeCandidates {
                        candidates: accessions.clone(),
                    },
                )
                .with_reason(format!(
                    "{} active clusters share clustering key {}",
                    accessions.len(),
                    key
                )),
            )?;
            for &loser in &accessions[1..] {
                self.merge(winner, loser)?;
                merged.push(loser);
            }
            let survivor = self.get_cluster(winner)?;
            if survivor.hash != hash {
                self.rekey_cluster(&survivor, &key)?;
            }
        }
        Ok(merged)
    }

    /// Re-derive the keys of an assembly's ACTIVE clusters and their members.
    ///
    /// Colliding clusters are merged first; then stale stored keys are
    /// corrected and members whose key no longer matches their cluster are
    /// split off.
    ///
    /// # Errors
    ///
    /// Returns store errors or errors raised by merge and split.
    pub fn rekey(&mut self, assembly: &str) -> Result<RekeyReport, ClusteringError> {
        let mut report = RekeyReport {
            merged: self.merge_duplicates(assembly)?,
            ..RekeyReport::default()
        };

        for listed in self.active_clusters(assembly)? {
            let mut cluster = self.get_cluster(listed.accession)?;
            if !cluster.is_active() {
                continue;
            }
            let key = match self.keys.for_cluster(&cluster) {
                Ok(key) => key,
                Err(e) => {
                    warn!("Skipping rs{}: {}", cluster.accession, e);
                    continue;
                }
            };
            if key.hash() != cluster.hash {
                self.rekey_cluster(&cluster, &key)?;
                report.rekeyed.push(cluster.accession);
                cluster = self.get_cluster(cluster.accession)?;
            }

            let diverging: Vec<u64> = self
                .active_members(cluster.accession)?
                .into_iter()
                .filter(|member| {
                    self.keys
                        .for_submitted(member)
                        .is_ok_and(|key| key.hash() != cluster.hash)
                })
                .map(|member| member.accession)
                .collect();
            if !diverging.is_empty() {
                report.split_into.extend(self.split(
                    cluster.accession,
                    &diverging,
                    "clustering key corrected",
                )?);
            }
        }
        Ok(report)
    }

    /// Follow `merged_into` links to the cluster that absorbed `rs`.
    ///
    /// Returns `None` for an unknown accession. ACTIVE and DEPRECATED clusters
    /// resolve to themselves.
    ///
    /// # Errors
    ///
    /// Returns `ClusteringError::MergeCycle` if the chain does not end.
    pub fn resolve(&self, rs: u64) -> Result<Option<ClusteredVariant>, ClusteringError> {
        let Some(mut current) = self.store.get::<ClusteredVariant>(&accession_key(rs))? else {
            return Ok(None);
        };
        for _ in 0..MAX_MERGE_CHAIN {
            match (current.status, current.merged_into) {
                (ClusterStatus::Merged, Some(next)) => current = self.get_cluster(next)?,
                _ => return Ok(Some(current)),
            }
        }
        Err(ClusteringError::MergeCycle(rs))
    }
}

pub(crate) fn require_active(
    cluster: &ClusteredVariant,
    operation: &'static str,
) -> Result<(), ClusteringError> {
    if cluster.is_active() {
        Ok(())
    } else {
        Err(ClusteringError::InvalidTransition {
            accession: cluster.accession,
            status: cluster.status,
            operation,
        })
    }
}
