use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::accession::hasher::clustering_key_fingerprint;
use crate::core::contig::ContigSynonyms;
use crate::core::types::VariantType;
use crate::core::variant::{ClusteredVariant, SubmittedVariant};
use crate::utils::validation::ValidationError;

/// The identity shared by every submitted variant of one cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusteringKey {
    pub assembly_accession: String,
    pub contig: String,
    /// Start after allele normalization
    pub start: u64,
    pub variant_type: VariantType,
}

impl ClusteringKey {
    /// Fingerprint stored on the cluster and used as its ACTIVE unique key
    #[must_use]
    pub fn hash(&self) -> String {
        clustering_key_fingerprint(self)
    }
}

impl std::fmt::Display for ClusteringKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.assembly_accession, self.contig, self.start, self.variant_type
        )
    }
}

/// Trim bases shared by both alleles, prefix first, then suffix.
///
/// Returns the start advanced past the trimmed prefix and the trimmed alleles.
///
/// # Examples
///
/// ```
/// use variant_accession::clustering::key::normalize_alleles;
///
/// assert_eq!(normalize_alleles(100, "A", "AT"), (101, String::new(), "T".to_string()));
/// assert_eq!(normalize_alleles(100, "CAT", "CGT"), (101, "A".to_string(), "G".to_string()));
/// ```
#[must_use]
pub fn normalize_alleles(start: u64, reference: &str, alternate: &str) -> (u64, String, String) {
    let r = reference.as_bytes();
    let a = alternate.as_bytes();

    let prefix = r.iter().zip(a.iter()).take_while(|(x, y)| x == y).count();
    let (r, a) = (&r[prefix..], &a[prefix..]);

    let suffix = r
        .iter()
        .rev()
        .zip(a.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let (r, a) = (&r[..r.len() - suffix], &a[..a.len() - suffix]);

    (
        start + prefix as u64,
        String::from_utf8_lossy(r).into_owned(),
        String::from_utf8_lossy(a).into_owned(),
    )
}

/// Derives clustering keys, resolving contigs through per-assembly synonyms.
///
/// Assemblies without a synonym table keep contig names as submitted.
#[derive(Debug, Clone, Default)]
pub struct KeyDeriver {
    synonyms: HashMap<String, ContigSynonyms>,
}

impl KeyDeriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_synonyms(mut self, synonyms: ContigSynonyms) -> Self {
        self.add_synonyms(synonyms);
        self
    }

    pub fn add_synonyms(&mut self, synonyms: ContigSynonyms) {
        self.synonyms
            .insert(synonyms.assembly_accession.clone(), synonyms);
    }

    pub fn synonyms(&self, assembly: &str) -> Option<&ContigSynonyms> {
        self.synonyms.get(assembly)
    }

    /// Canonical contig name within an assembly.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownContig` when the assembly has a synonym
    /// table that does not list the contig.
    pub fn canonical_contig(&self, assembly: &str, contig: &str) -> Result<String, ValidationError> {
        match self.synonyms.get(assembly) {
            None => Ok(contig.to_string()),
            Some(table) => table.canonical(contig).map(str::to_string).ok_or_else(|| {
                ValidationError::UnknownContig {
                    contig: contig.to_string(),
                    assembly: assembly.to_string(),
                }
            }),
        }
    }

    /// Key of a variant given by its coordinates and alleles
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownContig` for contigs outside the assembly.
    pub fn key(
        &self,
        assembly: &str,
        contig: &str,
        start: u64,
        reference: &str,
        alternate: &str,
    ) -> Result<ClusteringKey, ValidationError> {
        let (start, reference, alternate) = normalize_alleles(start, reference, alternate);
        Ok(ClusteringKey {
            assembly_accession: assembly.to_string(),
            contig: self.canonical_contig(assembly, contig)?,
            start,
            variant_type: VariantType::classify(&reference, &alternate),
        })
    }

    /// Key of a submitted variant
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownContig` for contigs outside the assembly.
    pub fn for_submitted(&self, ss: &SubmittedVariant) -> Result<ClusteringKey, ValidationError> {
        self.key(
            &ss.reference_sequence_accession,
            &ss.contig,
            ss.start,
            &ss.reference_allele,
            &ss.alternate_allele,
        )
    }

    /// Key a cluster would have under the current synonym tables
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownContig` for contigs outside the assembly.
    pub fn for_cluster(&self, rs: &ClusteredVariant) -> Result<ClusteringKey, ValidationError> {
        Ok(ClusteringKey {
            assembly_accession: rs.assembly_accession.clone(),
            contig: self.canonical_contig(&rs.assembly_accession, &rs.contig)?,
            start: rs.start,
            variant_type: rs.variant_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::contig::{ContigEntry, SequenceRole};

    fn deriver() -> KeyDeriver {
        KeyDeriver::new().with_synonyms(ContigSynonyms::new(
            "GCA_1",
            vec![ContigEntry {
                canonical: "CM000663.2".to_string(),
                aliases: vec!["1".to_string(), "chr1".to_string()],
                length: None,
                role: SequenceRole::AssembledMolecule,
            }],
        ))
    }

    #[test]
    fn test_normalize_alleles() {
        assert_eq!(normalize_alleles(100, "A", "T"), (100, "A".into(), "T".into()));
        assert_eq!(normalize_alleles(100, "AT", "A"), (101, "T".into(), String::new()));
        assert_eq!(normalize_alleles(100, "", "T"), (100, String::new(), "T".into()));
        // Shared prefix is removed before the suffix
        assert_eq!(normalize_alleles(100, "AA", "A"), (101, "A".into(), String::new()));
        assert_eq!(normalize_alleles(100, "GTC", "GC"), (101, "T".into(), String::new()));
        assert_eq!(normalize_alleles(100, "A", "A"), (101, String::new(), String::new()));
    }

    #[test]
    fn test_synonyms_share_a_key() {
        let keys = deriver();
        let a = keys.key("GCA_1", "chr1", 100, "A", "T").unwrap();
        let b = keys.key("GCA_1", "1", 100, "A", "T").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.contig, "CM000663.2");
        assert_eq!(a.variant_type, VariantType::Snv);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_unknown_contig() {
        let err = deriver().key("GCA_1", "chr2", 100, "A", "T").unwrap_err();
        assert_eq!(err.label(), "unknown_contig");
        // Assemblies without a table accept any contig
        assert!(deriver().key("GCA_2", "chr2", 100, "A", "T").is_ok());
    }

    #[test]
    fn test_type_and_position_distinguish_keys() {
        let keys = KeyDeriver::new();
        let snv = keys.key("GCA_1", "1", 100, "A", "T").unwrap();
        let other_pos = keys.key("GCA_1", "1", 101, "A", "T").unwrap();
        let del = keys.key("GCA_1", "1", 99, "CA", "C").unwrap();
        assert_ne!(snv.hash(), other_pos.hash());
        assert_eq!(del.start, 100);
        assert_eq!(del.variant_type, VariantType::Del);
        assert_ne!(snv.hash(), del.hash());
    }
}
