use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::clustering::engine::require_active;
use crate::core::event::{EventKind, OperationEvent};
use crate::core::types::{Category, ClusterStatus, SubmittedStatus};
use crate::core::variant::{accession_key, ClusteredVariant, SubmittedVariant};
use crate::lifecycle::LifecycleError;
use crate::store::{Filter, RecordStore};
use crate::utils::validation::is_valid_allele;

/// Reason recorded when alleles fall outside the accepted alphabet
pub const INVALID_ALLELES_REASON: &str = "alleles outside the accepted nucleotide alphabet";

/// Accessions changed by a deprecation request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeprecationReport {
    pub submitted_deprecated: Vec<u64>,
    pub clusters_deprecated: Vec<u64>,
    /// Requested submitted variants that were already deprecated
    pub unchanged: Vec<u64>,
}

/// Retires submitted and clustered variants.
///
/// Nothing is ever deleted: records change status and every change is
/// recorded as a `DEPRECATED` event carrying the prior state.
pub struct DeprecationEngine<S> {
    store: S,
}

impl<S: RecordStore> DeprecationEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Deprecate submitted variants by accession.
    ///
    /// Repeated accessions are handled once. A cluster left without any ACTIVE member is deprecated as well, with
    /// the same reason.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::NotFound` if an accession is unknown (nothing
    /// is changed in that case), or store errors.
    pub fn deprecate_submitted(
        &self,
        accessions: &[u64],
        reason: &str,
    ) -> Result<DeprecationReport, LifecycleError> {
        let requested: BTreeSet<u64> = accessions.iter().copied().collect();
        let mut records = Vec::with_capacity(requested.len());
        for accession in requested {
            let record: SubmittedVariant = self
                .store
                .find_one_by_unique("accession", &accession.to_string())?
                .ok_or(LifecycleError::NotFound {
                    category: Category::Ss,
                    accession,
                })?;
            records.push(record);
        }

        let mut report = DeprecationReport::default();
        let mut affected = BTreeSet::new();
        for record in records {
            if !record.is_active() {
                report.unchanged.push(record.accession);
                continue;
            }
            let mut deprecated = record.clone();
            deprecated.status = SubmittedStatus::Deprecated;
            deprecated.last_updated_at = Utc::now();
            self.store.replace(&deprecated)?;
            self.store.insert(
                &OperationEvent::new(Category::Ss, record.accession, EventKind::Deprecated)
                    .with_reason(reason)
                    .with_snapshot(&record),
            )?;
            debug!("Deprecated ss{}", record.accession);
            report.submitted_deprecated.push(record.accession);
            if let Some(rs) = record.clustered_variant_accession {
                affected.insert(rs);
            }
        }

        for rs in affected {
            let Some(cluster) = self.store.get::<ClusteredVariant>(&accession_key(rs))? else {
                continue;
            };
            if cluster.is_active() && !self.has_active_member(rs)? {
                self.deprecate_cluster_record(&cluster, reason)?;
                report.clusters_deprecated.push(rs);
            }
        }

        info!(
            "Deprecated {} submitted and {} clustered variant(s): {}",
            report.submitted_deprecated.len(),
            report.clusters_deprecated.len(),
            reason
        );
        Ok(report)
    }

    /// Deprecate every ACTIVE submitted variant of a withdrawn project
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn deprecate_project(
        &self,
        assembly: &str,
        project: &str,
        reason: &str,
    ) -> Result<DeprecationReport, LifecycleError> {
        let accessions: Vec<u64> = self
            .store
            .find::<SubmittedVariant>(
                &Filter::new()
                    .eq("project_accession", project)
                    .eq("reference_sequence_accession", assembly)
                    .eq("status", SubmittedStatus::Active),
            )?
            .into_iter()
            .map(|ss| ss.accession)
            .collect();
        self.deprecate_submitted(&accessions, reason)
    }

    /// Deprecate ACTIVE submitted variants whose alleles use bases outside
    /// the accepted alphabet
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn deprecate_invalid_alleles(
        &self,
        assembly: &str,
    ) -> Result<DeprecationReport, LifecycleError> {
        let accessions: Vec<u64> = self
            .store
            .find::<SubmittedVariant>(
                &Filter::new()
                    .eq("reference_sequence_accession", assembly)
                    .eq("status", SubmittedStatus::Active),
            )?
            .into_iter()
            .filter(|ss| {
                !is_valid_allele(&ss.reference_allele) || !is_valid_allele(&ss.alternate_allele)
            })
            .map(|ss| ss.accession)
            .collect();
        self.deprecate_submitted(&accessions, INVALID_ALLELES_REASON)
    }

    /// Deprecate ACTIVE clusters of an assembly that have no ACTIVE member
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn deprecate_orphan_clusters(
        &self,
        assembly: &str,
        reason: &str,
    ) -> Result<DeprecationReport, LifecycleError> {
        let clusters: Vec<ClusteredVariant> = self.store.find(
            &Filter::new()
                .eq("assembly_accession", assembly)
                .eq("status", ClusterStatus::Active),
        )?;

        let mut report = DeprecationReport::default();
        for cluster in clusters {
            if !self.has_active_member(cluster.accession)? {
                self.deprecate_cluster_record(&cluster, reason)?;
                report.clusters_deprecated.push(cluster.accession);
            }
        }
        info!(
            "Deprecated {} orphan cluster(s) in {}",
            report.clusters_deprecated.len(),
            assembly
        );
        Ok(report)
    }

    /// Deprecate one ACTIVE cluster together with its ACTIVE members.
    ///
    /// Every member is deprecated first with its own event, so no ACTIVE
    /// submitted variant is left pointing at a DEPRECATED cluster.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::NotFound` for unknown accessions and an
    /// invalid-transition error if the cluster is MERGED or DEPRECATED.
    pub fn deprecate_cluster(
        &self,
        rs: u64,
        reason: &str,
    ) -> Result<DeprecationReport, LifecycleError> {
        let cluster: ClusteredVariant = self.store.get(&accession_key(rs))?.ok_or(
            LifecycleError::NotFound {
                category: Category::Rs,
                accession: rs,
            },
        )?;
        require_active(&cluster, "deprecation")?;

        let members: Vec<u64> = self
            .active_members(rs)?
            .into_iter()
            .map(|ss| ss.accession)
            .collect();
        let mut report = self.deprecate_submitted(&members, reason)?;
        if !report.clusters_deprecated.contains(&rs) {
            self.deprecate_cluster_record(&cluster, reason)?;
            report.clusters_deprecated.push(rs);
        }
        Ok(report)
    }

    fn deprecate_cluster_record(
        &self,
        cluster: &ClusteredVariant,
        reason: &str,
    ) -> Result<(), LifecycleError> {
        require_active(cluster, "deprecation")?;
        let mut deprecated = cluster.clone();
        deprecated.status = ClusterStatus::Deprecated;
        deprecated.deprecation_reason = Some(reason.to_string());
        deprecated.last_updated_at = Utc::now();
        self.store.replace(&deprecated)?;
        self.store.insert(
            &OperationEvent::new(Category::Rs, cluster.accession, EventKind::Deprecated)
                .with_reason(reason)
                .with_snapshot(cluster),
        )?;
        debug!("Deprecated rs{}", cluster.accession);
        Ok(())
    }

    fn active_members(&self, rs: u64) -> Result<Vec<SubmittedVariant>, LifecycleError> {
        let members: Vec<SubmittedVariant> = self
            .store
            .find(&Filter::new().eq("clustered_variant_accession", rs))?;
        Ok(members.into_iter().filter(SubmittedVariant::is_active).collect())
    }

    fn has_active_member(&self, rs: u64) -> Result<bool, LifecycleError> {
        Ok(!self.active_members(rs)?.is_empty())
    }
}
