//! Centralized validation of variant submissions.

use crate::accession::hasher::FIELD_SEPARATOR;
use crate::core::variant::VariantSubmission;

/// Nucleotides accepted in reference and alternate alleles
pub const ACCEPTED_NUCLEOTIDES: [char; 5] = ['A', 'C', 'G', 'T', 'N'];

/// Maximum allele length accepted on input (DOS protection)
pub const MAX_ALLELE_LENGTH: usize = 65_536;

/// Data-quality errors: the record is skipped (or the job halts without `force_import`)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Empty {0}")]
    EmptyField(&'static str),
    #[error("Invalid start position {0}: positions are 1-based")]
    InvalidStart(u64),
    #[error("Allele '{0}' contains characters outside A, C, G, T, N")]
    InvalidAllele(String),
    #[error("Allele exceeds maximum length of {MAX_ALLELE_LENGTH}")]
    AlleleTooLong,
    #[error("Both alleles are empty")]
    EmptyAlleles,
    #[error("Field {0} contains the reserved separator character")]
    SeparatorInField(&'static str),
    #[error("Contig '{contig}' is not a known sequence of assembly {assembly}")]
    UnknownContig { contig: String, assembly: String },
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
}

impl ValidationError {
    /// Stable short label used to count skips by reason
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::EmptyField(_) => "empty_field",
            Self::InvalidStart(_) => "invalid_start",
            Self::InvalidAllele(_) => "invalid_allele",
            Self::AlleleTooLong => "allele_too_long",
            Self::EmptyAlleles => "empty_alleles",
            Self::SeparatorInField(_) => "reserved_separator",
            Self::UnknownContig { .. } => "unknown_contig",
            Self::MalformedRecord(_) => "malformed_record",
        }
    }
}

/// Check that an allele only uses the accepted nucleotide alphabet.
///
/// The empty allele is valid (insertions and deletions without context base).
///
/// # Examples
///
/// ```
/// use variant_accession::utils::validation::is_valid_allele;
///
/// assert!(is_valid_allele("ACGTN"));
/// assert!(is_valid_allele(""));
/// assert!(!is_valid_allele("A*"));
/// assert!(!is_valid_allele("<DEL>"));
/// ```
#[must_use]
pub fn is_valid_allele(allele: &str) -> bool {
    allele.chars().all(|c| ACCEPTED_NUCLEOTIDES.contains(&c))
}

/// Uppercase an allele and map the `-`/`.` placeholders to the empty allele
#[must_use]
pub fn normalize_allele(allele: &str) -> String {
    let trimmed = allele.trim();
    if trimmed == "-" || trimmed == "." {
        String::new()
    } else {
        trimmed.to_ascii_uppercase()
    }
}

/// Validate the identity fields of a submission before it is hashed.
///
/// # Errors
///
/// Returns the first data-quality problem found.
pub fn validate_submission(submission: &VariantSubmission) -> Result<(), ValidationError> {
    let text_fields = [
        ("assembly accession", &submission.reference_sequence_accession),
        ("project accession", &submission.project_accession),
        ("contig", &submission.contig),
    ];
    for (name, value) in text_fields {
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyField(name));
        }
    }

    let all_fields = [
        ("assembly accession", &submission.reference_sequence_accession),
        ("project accession", &submission.project_accession),
        ("contig", &submission.contig),
        ("reference allele", &submission.reference_allele),
        ("alternate allele", &submission.alternate_allele),
    ];
    for (name, value) in all_fields {
        if value.contains(FIELD_SEPARATOR) {
            return Err(ValidationError::SeparatorInField(name));
        }
    }

    if submission.start == 0 {
        return Err(ValidationError::InvalidStart(submission.start));
    }

    let alleles = [&submission.reference_allele, &submission.alternate_allele];
    if alleles.iter().all(|a| a.is_empty()) {
        return Err(ValidationError::EmptyAlleles);
    }
    for allele in alleles {
        if allele.len() > MAX_ALLELE_LENGTH {
            return Err(ValidationError::AlleleTooLong);
        }
        if !is_valid_allele(allele) {
            return Err(ValidationError::InvalidAllele(allele.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(reference: &str, alternate: &str) -> VariantSubmission {
        VariantSubmission::new("GCA_1", "PRJ1", "1", 100, reference, alternate)
    }

    #[test]
    fn test_valid_submission() {
        assert!(validate_submission(&submission("A", "T")).is_ok());
        assert!(validate_submission(&submission("", "T")).is_ok());
        assert!(validate_submission(&submission("ACGT", "N")).is_ok());
    }

    #[test]
    fn test_invalid_alleles() {
        let err = validate_submission(&submission("A", "R")).unwrap_err();
        assert_eq!(err, ValidationError::InvalidAllele("R".to_string()));
        assert_eq!(err.label(), "invalid_allele");

        // Lowercase is not normalized here
        assert!(validate_submission(&submission("a", "T")).is_err());
        assert_eq!(
            validate_submission(&submission("", "")).unwrap_err(),
            ValidationError::EmptyAlleles
        );
    }

    #[test]
    fn test_empty_fields_and_start() {
        let mut s = submission("A", "T");
        s.contig = " ".to_string();
        assert_eq!(
            validate_submission(&s).unwrap_err(),
            ValidationError::EmptyField("contig")
        );

        let mut s = submission("A", "T");
        s.start = 0;
        assert_eq!(
            validate_submission(&s).unwrap_err(),
            ValidationError::InvalidStart(0)
        );
    }

    #[test]
    fn test_separator_rejected() {
        let mut s = submission("A", "T");
        s.project_accession = format!("PRJ{FIELD_SEPARATOR}1");
        assert_eq!(
            validate_submission(&s).unwrap_err(),
            ValidationError::SeparatorInField("project accession")
        );
    }

    #[test]
    fn test_normalize_allele() {
        assert_eq!(normalize_allele("acgt"), "ACGT");
        assert_eq!(normalize_allele("-"), "");
        assert_eq!(normalize_allele(" T "), "T");
    }
}
