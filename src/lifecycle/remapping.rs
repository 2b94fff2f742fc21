use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::accession::{AccessionGenerator, AccessionOutcome};
use crate::clustering::ClusteringEngine;
use crate::core::event::{EventKind, OperationEvent};
use crate::core::types::Category;
use crate::core::variant::{RemapProvenance, SubmittedVariant, VariantSubmission};
use crate::lifecycle::LifecycleError;
use crate::store::RecordStore;

/// New coordinates of one submitted variant in the target assembly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapEntry {
    /// Accession of the submitted variant in its source assembly
    pub ss_accession: u64,
    pub contig: String,
    pub start: u64,
    /// Alleles in the target assembly; the source alleles when absent
    #[serde(default)]
    pub reference_allele: Option<String>,
    #[serde(default)]
    pub alternate_allele: Option<String>,
}

/// A submitted variant carried over to the target assembly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemappedVariant {
    pub source: u64,
    pub target: u64,
    pub clustered_variant_accession: u64,
    pub outcome: AccessionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemapSkip {
    pub ss_accession: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemapReport {
    pub remapped: Vec<RemappedVariant>,
    pub skipped: Vec<RemapSkip>,
}

impl RemapReport {
    fn skip(&mut self, ss_accession: u64, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Not remapping ss{}: {}", ss_accession, reason);
        self.skipped.push(RemapSkip {
            ss_accession,
            reason,
        });
    }
}

/// Carries submitted variants into a new assembly.
///
/// The remapped variant is a new submitted variant (its identity includes the
/// assembly) that records where it came from; the source record is left as
/// it is. Remapping the same entry again resolves to the same accession.
pub struct RemappingEngine<S> {
    store: S,
    submitted: AccessionGenerator<S>,
    clustering: ClusteringEngine<S>,
}

impl<S: RecordStore + Clone> RemappingEngine<S> {
    pub fn new(store: S, submitted: AccessionGenerator<S>, clustering: ClusteringEngine<S>) -> Self {
        Self {
            store,
            submitted,
            clustering,
        }
    }

    /// Remap a batch of submitted variants into `target_assembly` and cluster
    /// them there.
    ///
    /// Entries that cannot be remapped (unknown or deprecated source, invalid
    /// target coordinates) are reported as skipped.
    ///
    /// # Errors
    ///
    /// Returns store or allocation errors that stop the whole batch.
    pub fn remap(
        &mut self,
        batch: &[RemapEntry],
        target_assembly: &str,
    ) -> Result<RemapReport, LifecycleError> {
        let mut report = RemapReport::default();

        for entry in batch {
            let source: Option<SubmittedVariant> = self
                .store
                .find_one_by_unique("accession", &entry.ss_accession.to_string())?;
            let Some(source) = source else {
                report.skip(entry.ss_accession, "submitted variant not found");
                continue;
            };
            if !source.is_active() {
                report.skip(entry.ss_accession, "submitted variant is deprecated");
                continue;
            }
            if source.reference_sequence_accession == target_assembly {
                report.skip(entry.ss_accession, "already in the target assembly");
                continue;
            }

            let submission = VariantSubmission {
                reference_sequence_accession: target_assembly.to_string(),
                project_accession: source.project_accession.clone(),
                contig: entry.contig.clone(),
                start: entry.start,
                reference_allele: entry
                    .reference_allele
                    .clone()
                    .unwrap_or_else(|| source.reference_allele.clone()),
                alternate_allele: entry
                    .alternate_allele
                    .clone()
                    .unwrap_or_else(|| source.alternate_allele.clone()),
                supported_by_evidence: source.supported_by_evidence,
            };
            let provenance = RemapProvenance {
                accession: source.accession,
                assembly_accession: source.reference_sequence_accession.clone(),
                contig: source.contig.clone(),
                start: source.start,
            };

            let (remapped, outcome) = match self.submitted.get_or_create_with(
                &submission,
                source.archive,
                |record| record.remapped_from = Some(provenance),
            ) {
                Ok(result) => result,
                Err(e) if e.is_record_scoped() => {
                    report.skip(entry.ss_accession, e.to_string());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if outcome == AccessionOutcome::New {
                self.store.insert(
                    &OperationEvent::new(Category::Ss, remapped.accession, EventKind::Created)
                        .with_reason(format!(
                            "remapped from ss{} in {}",
                            source.accession, source.reference_sequence_accession
                        )),
                )?;
            }

            let rs = match self.clustering.cluster(&remapped) {
                Ok(rs) => rs,
                Err(e) if e.is_record_scoped() => {
                    report.skip(entry.ss_accession, e.to_string());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            report.remapped.push(RemappedVariant {
                source: source.accession,
                target: remapped.accession,
                clustered_variant_accession: rs,
                outcome,
            });
        }

        self.submitted.commit()?;
        self.clustering.generator_mut().commit()?;
        info!(
            "Remapped {} submitted variant(s) into {} ({} skipped)",
            report.remapped.len(),
            target_assembly,
            report.skipped.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accession::GeneratorSettings;
    use crate::clustering::KeyDeriver;
    use crate::core::types::Archive;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    type Store = Arc<MemoryStore>;

    fn generator(store: &Store) -> AccessionGenerator<Store> {
        AccessionGenerator::new(
            Arc::clone(store),
            Category::Ss,
            GeneratorSettings::new("w1", "run1"),
        )
    }

    fn engine(store: &Store) -> RemappingEngine<Store> {
        RemappingEngine::new(
            Arc::clone(store),
            generator(store),
            ClusteringEngine::new(
                Arc::clone(store),
                GeneratorSettings::new("w1", "run1"),
                Arc::new(KeyDeriver::new()),
            ),
        )
    }

    fn source(store: &Store) -> SubmittedVariant {
        let submission = VariantSubmission::new("GCA_OLD", "PRJ1", "1", 100, "A", "T");
        generator(store).get_or_create(&submission, Archive::Dbsnp).unwrap().0
    }

    fn entry(ss_accession: u64) -> RemapEntry {
        RemapEntry {
            ss_accession,
            contig: "CM000663.2".to_string(),
            start: 1100,
            reference_allele: None,
            alternate_allele: None,
        }
    }

    #[test]
    fn test_remap_issues_new_accession_with_provenance() {
        let store = Arc::new(MemoryStore::new());
        let original = source(&store);

        let report = engine(&store).remap(&[entry(original.accession)], "GCA_NEW").unwrap();
        assert_eq!(report.remapped.len(), 1);
        let remapped = &report.remapped[0];
        assert_eq!(remapped.outcome, AccessionOutcome::New);
        assert_ne!(remapped.target, original.accession);

        let record: SubmittedVariant = store
            .find_one_by_unique("accession", &remapped.target.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(record.reference_sequence_accession, "GCA_NEW");
        assert_eq!(record.start, 1100);
        assert_eq!(record.archive, Archive::Dbsnp);
        assert_eq!(record.clustered_variant_accession, Some(remapped.clustered_variant_accession));
        let provenance = record.remapped_from.unwrap();
        assert_eq!(provenance.accession, original.accession);
        assert_eq!(provenance.assembly_accession, "GCA_OLD");

        // The source is untouched
        let untouched: SubmittedVariant = store.get(&original.hash).unwrap().unwrap();
        assert_eq!(untouched, original);
    }

    #[test]
    fn test_remap_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let original = source(&store);

        let first = engine(&store).remap(&[entry(original.accession)], "GCA_NEW").unwrap();
        let second = engine(&store).remap(&[entry(original.accession)], "GCA_NEW").unwrap();
        assert_eq!(second.remapped[0].outcome, AccessionOutcome::Existing);
        assert_eq!(second.remapped[0].target, first.remapped[0].target);
        assert_eq!(
            second.remapped[0].clustered_variant_accession,
            first.remapped[0].clustered_variant_accession
        );
        assert_eq!(store.count::<SubmittedVariant>().unwrap(), 2);
    }

    #[test]
    fn test_remap_skips_unusable_entries() {
        let store = Arc::new(MemoryStore::new());
        let original = source(&store);

        let bad_alleles = RemapEntry {
            alternate_allele: Some("X".to_string()),
            ..entry(original.accession)
        };
        let report = engine(&store)
            .remap(&[entry(42), bad_alleles], "GCA_NEW")
            .unwrap();
        assert!(report.remapped.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].ss_accession, 42);

        let report = engine(&store).remap(&[entry(original.accession)], "GCA_OLD").unwrap();
        assert_eq!(report.skipped[0].reason, "already in the target assembly");
    }
}
