//! Content fingerprints used as deduplication keys.
//!
//! A fingerprint is the uppercase hex SHA-1 of the identity fields joined by
//! [`FIELD_SEPARATOR`]. Validation rejects fields containing the separator, so
//! distinct field tuples always produce distinct digest inputs.

use sha1::{Digest, Sha1};

use crate::clustering::key::ClusteringKey;
use crate::core::variant::VariantSubmission;

/// ASCII unit separator, never valid inside an identity field
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// Length of a rendered fingerprint (SHA-1, hex)
pub const FINGERPRINT_LENGTH: usize = 40;

/// Digest a list of fields.
///
/// # Examples
///
/// ```
/// use variant_accession::accession::hasher::fingerprint_fields;
///
/// let a = fingerprint_fields(&["GCA_1", "PRJ1", "1", "100", "A", "T"]);
/// let b = fingerprint_fields(&["GCA_1", "PRJ1", "1", "100", "A", "T"]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 40);
/// assert_eq!(a, a.to_uppercase());
/// ```
#[must_use]
pub fn fingerprint_fields(fields: &[&str]) -> String {
    let mut separator = [0_u8; 4];
    let separator: &str = FIELD_SEPARATOR.encode_utf8(&mut separator);

    let mut hasher = Sha1::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update(separator.as_bytes());
        }
        hasher.update(field.as_bytes());
    }
    format!("{:X}", hasher.finalize())
}

/// Fingerprint of a submitted variant's six identity fields
#[must_use]
pub fn submitted_variant_fingerprint(submission: &VariantSubmission) -> String {
    let start = submission.start.to_string();
    fingerprint_fields(&[
        &submission.reference_sequence_accession,
        &submission.project_accession,
        &submission.contig,
        &start,
        &submission.reference_allele,
        &submission.alternate_allele,
    ])
}

/// Fingerprint of a clustering key (assembly, contig, start, type)
#[must_use]
pub fn clustering_key_fingerprint(key: &ClusteringKey) -> String {
    let start = key.start.to_string();
    let variant_type = key.variant_type.to_string();
    fingerprint_fields(&[&key.assembly_accession, &key.contig, &start, &variant_type])
}
