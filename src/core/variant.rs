use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{Archive, ClusterStatus, SubmittedStatus, VariantType};
use crate::store::Document;

/// Primary-key form of an accession that sorts numerically
#[must_use]
pub fn accession_key(accession: u64) -> String {
    format!("{accession:020}")
}

/// A parsed variant submission, before it has an accession.
///
/// The six identity fields are exactly the inputs of the submitted-variant
/// fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSubmission {
    /// Reference sequence (assembly) accession, e.g. `GCA_000001405.15`
    pub reference_sequence_accession: String,
    /// Project/study accession, e.g. `PRJEB1234`
    pub project_accession: String,
    pub contig: String,
    /// 1-based start position
    pub start: u64,
    pub reference_allele: String,
    pub alternate_allele: String,
    #[serde(default = "default_true")]
    pub supported_by_evidence: bool,
}

fn default_true() -> bool {
    true
}

impl VariantSubmission {
    pub fn new(
        assembly: impl Into<String>,
        project: impl Into<String>,
        contig: impl Into<String>,
        start: u64,
        reference_allele: impl Into<String>,
        alternate_allele: impl Into<String>,
    ) -> Self {
        Self {
            reference_sequence_accession: assembly.into(),
            project_accession: project.into(),
            contig: contig.into(),
            start,
            reference_allele: reference_allele.into(),
            alternate_allele: alternate_allele.into(),
            supported_by_evidence: true,
        }
    }
}

/// Where a remapped submitted variant came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapProvenance {
    /// Accession of the submitted variant in the source assembly
    pub accession: u64,
    pub assembly_accession: String,
    pub contig: String,
    pub start: u64,
}

/// A submitted variant (SS) record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedVariant {
    /// Fingerprint of the identity fields (primary key)
    pub hash: String,
    pub accession: u64,
    pub reference_sequence_accession: String,
    pub project_accession: String,
    pub contig: String,
    pub start: u64,
    pub reference_allele: String,
    pub alternate_allele: String,
    /// Back-reference to the clustered variant this submission belongs to
    #[serde(default)]
    pub clustered_variant_accession: Option<u64>,
    pub supported_by_evidence: bool,
    #[serde(default)]
    pub status: SubmittedStatus,
    #[serde(default)]
    pub archive: Archive,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remapped_from: Option<RemapProvenance>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl SubmittedVariant {
    #[must_use]
    pub fn from_submission(
        submission: &VariantSubmission,
        hash: String,
        accession: u64,
        archive: Archive,
    ) -> Self {
        let now = Utc::now();
        Self {
            hash,
            accession,
            reference_sequence_accession: submission.reference_sequence_accession.clone(),
            project_accession: submission.project_accession.clone(),
            contig: submission.contig.clone(),
            start: submission.start,
            reference_allele: submission.reference_allele.clone(),
            alternate_allele: submission.alternate_allele.clone(),
            clustered_variant_accession: None,
            supported_by_evidence: submission.supported_by_evidence,
            status: SubmittedStatus::Active,
            archive,
            remapped_from: None,
            created_at: now,
            last_updated_at: now,
        }
    }

    /// The identity fields of this record
    #[must_use]
    pub fn submission(&self) -> VariantSubmission {
        VariantSubmission {
            reference_sequence_accession: self.reference_sequence_accession.clone(),
            project_accession: self.project_accession.clone(),
            contig: self.contig.clone(),
            start: self.start,
            reference_allele: self.reference_allele.clone(),
            alternate_allele: self.alternate_allele.clone(),
            supported_by_evidence: self.supported_by_evidence,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SubmittedStatus::Active
    }
}

impl Document for SubmittedVariant {
    const COLLECTION: &'static str = "submitted_variants";
    const INDEXED_FIELDS: &'static [&'static str] = &[
        "clustered_variant_accession",
        "reference_sequence_accession",
        "project_accession",
    ];

    fn key(&self) -> String {
        self.hash.clone()
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("accession", self.accession.to_string())]
    }
}

/// A clustered variant (RS) record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteredVariant {
    pub accession: u64,
    /// Fingerprint of the clustering key
    pub hash: String,
    pub assembly_accession: String,
    pub contig: String,
    pub start: u64,
    pub variant_type: VariantType,
    pub status: ClusterStatus,
    #[serde(default)]
    pub merged_into: Option<u64>,
    #[serde(default)]
    pub deprecation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl ClusteredVariant {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ClusterStatus::Active
    }
}

impl Document for ClusteredVariant {
    const COLLECTION: &'static str = "clustered_variants";
    const INDEXED_FIELDS: &'static [&'static str] = &["assembly_accession", "merged_into"];

    fn key(&self) -> String {
        accession_key(self.accession)
    }

    /// Only ACTIVE clusters hold their clustering key
    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        if self.is_active() {
            vec![("active_key", self.hash.clone())]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accession_key_sorts_numerically() {
        let mut keys = vec![accession_key(100), accession_key(9), accession_key(5_000_000_000)];
        keys.sort();
        assert_eq!(keys[0], accession_key(9));
        assert_eq!(keys[2], accession_key(5_000_000_000));
    }

    #[test]
    fn test_submitted_variant_round_trips_identity() {
        let submission = VariantSubmission::new("GCA_1", "PRJ1", "1", 100, "A", "T");
        let record = SubmittedVariant::from_submission(&submission, "H".into(), 5, Archive::Eva);
        assert_eq!(record.submission(), submission);
        assert!(record.is_active());
        assert_eq!(record.unique_keys(), vec![("accession", "5".to_string())]);
    }
}
