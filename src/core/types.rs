use serde::{Deserialize, Serialize};

/// Accession category: each category draws from its own counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Submitted variant (SS)
    Ss,
    /// Clustered variant (RS)
    Rs,
}

impl Category {
    /// Name of the shared counter backing this category
    #[must_use]
    pub fn counter_name(self) -> &'static str {
        match self {
            Self::Ss => "ss_accession_counter",
            Self::Rs => "rs_accession_counter",
        }
    }

    /// Conventional first accession issued in a fresh archive
    #[must_use]
    pub fn default_first_accession(self) -> u64 {
        match self {
            Self::Ss => 5_000_000_000,
            Self::Rs => 3_000_000_000,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ss" => Some(Self::Ss),
            "rs" => Some(Self::Rs),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ss => write!(f, "ss"),
            Self::Rs => write!(f, "rs"),
        }
    }
}

/// Lifecycle status of a clustered variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    Active,
    /// Terminal: subsumed by another cluster (`merged_into` is set)
    Merged,
    /// Terminal: no longer supported (`deprecation_reason` is set)
    Deprecated,
}

impl ClusterStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Merged => write!(f, "MERGED"),
            Self::Deprecated => write!(f, "DEPRECATED"),
        }
    }
}

/// Status of a submitted variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmittedStatus {
    #[default]
    Active,
    Deprecated,
}

/// Archive a submitted variant is loaded into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Archive {
    #[default]
    Eva,
    Dbsnp,
}

impl std::fmt::Display for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eva => write!(f, "EVA"),
            Self::Dbsnp => write!(f, "DBSNP"),
        }
    }
}

/// Variant class derived from normalized alleles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantType {
    /// Single nucleotide variant
    Snv,
    /// Multi-nucleotide variant (equal-length alleles longer than one base)
    Mnv,
    Ins,
    Del,
    Indel,
    /// Reference and alternate are identical
    NoSequenceAlteration,
}

impl VariantType {
    /// Classify a pair of alleles that have already been trimmed of shared context
    #[must_use]
    pub fn classify(reference: &str, alternate: &str) -> Self {
        match (reference.len(), alternate.len()) {
            _ if reference == alternate => Self::NoSequenceAlteration,
            (0, _) => Self::Ins,
            (_, 0) => Self::Del,
            (1, 1) => Self::Snv,
            (r, a) if r == a => Self::Mnv,
            _ => Self::Indel,
        }
    }
}

impl std::fmt::Display for VariantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Snv => "SNV",
            Self::Mnv => "MNV",
            Self::Ins => "INS",
            Self::Del => "DEL",
            Self::Indel => "INDEL",
            Self::NoSequenceAlteration => "NO_SEQUENCE_ALTERATION",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_variant_types() {
        assert_eq!(VariantType::classify("A", "T"), VariantType::Snv);
        assert_eq!(VariantType::classify("AC", "TG"), VariantType::Mnv);
        assert_eq!(VariantType::classify("", "T"), VariantType::Ins);
        assert_eq!(VariantType::classify("AT", ""), VariantType::Del);
        assert_eq!(VariantType::classify("AT", "G"), VariantType::Indel);
        assert_eq!(VariantType::classify("A", "A"), VariantType::NoSequenceAlteration);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(Category::parse("SS"), Some(Category::Ss));
        assert_eq!(Category::parse("rs"), Some(Category::Rs));
        assert_eq!(Category::parse("xx"), None);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&ClusterStatus::Merged).unwrap();
        assert_eq!(json, "\"MERGED\"");
        assert!(ClusterStatus::Deprecated.is_terminal());
        assert!(!ClusterStatus::Active.is_terminal());
    }
}
