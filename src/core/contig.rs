use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sequence role from NCBI assembly report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SequenceRole {
    /// Primary chromosome (1-22, X, Y, MT)
    AssembledMolecule,
    /// Alternate locus scaffold
    AltScaffold,
    /// Fix patch (error correction)
    FixPatch,
    /// Novel patch (new sequence)
    NovelPatch,
    /// Unlocalized scaffold (known chromosome, unknown location)
    UnlocalizedScaffold,
    /// Unplaced scaffold (unknown chromosome)
    UnplacedScaffold,
    /// Role not specified or unknown
    #[default]
    Unknown,
}

impl SequenceRole {
    /// Parse a sequence role from string representation (e.g. from NCBI assembly report)
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "assembled-molecule" => SequenceRole::AssembledMolecule,
            "alt-scaffold" => SequenceRole::AltScaffold,
            "fix-patch" => SequenceRole::FixPatch,
            "novel-patch" => SequenceRole::NovelPatch,
            "unlocalized-scaffold" => SequenceRole::UnlocalizedScaffold,
            "unplaced-scaffold" => SequenceRole::UnplacedScaffold,
            _ => SequenceRole::Unknown,
        }
    }
}

/// One sequence of an assembly and every name it is known by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContigEntry {
    /// Name used in clustering keys (INSDC accession when available)
    pub canonical: String,
    /// Known alternative names, canonical excluded
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default)]
    pub role: SequenceRole,
}

/// Contig synonym table of one assembly.
///
/// Name equivalence is defined only through explicit aliases: a contig absent
/// from the table is unknown, never guessed from naming conventions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContigSynonyms {
    pub assembly_accession: String,
    pub entries: Vec<ContigEntry>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
}

impl ContigSynonyms {
    pub fn new(assembly_accession: impl Into<String>, entries: Vec<ContigEntry>) -> Self {
        let mut synonyms = Self {
            assembly_accession: assembly_accession.into(),
            entries,
            by_name: HashMap::new(),
        };
        synonyms.rebuild_index();
        synonyms
    }

    pub fn rebuild_index(&mut self) {
        self.by_name.clear();
        for (idx, entry) in self.entries.iter().enumerate() {
            self.by_name.insert(entry.canonical.clone(), idx);
            for alias in &entry.aliases {
                self.by_name.entry(alias.clone()).or_insert(idx);
            }
        }
    }

    /// Canonical name for any known synonym
    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.by_name
            .get(name)
            .map(|&idx| self.entries[idx].canonical.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chr1() -> ContigEntry {
        ContigEntry {
            canonical: "CM000663.2".to_string(),
            aliases: vec!["1".to_string(), "chr1".to_string(), "NC_000001.11".to_string()],
            length: Some(248_956_422),
            role: SequenceRole::AssembledMolecule,
        }
    }

    #[test]
    fn test_canonical_lookup() {
        let synonyms = ContigSynonyms::new("GCA_000001405.15", vec![chr1()]);
        assert_eq!(synonyms.canonical("chr1"), Some("CM000663.2"));
        assert_eq!(synonyms.canonical("1"), Some("CM000663.2"));
        assert_eq!(synonyms.canonical("CM000663.2"), Some("CM000663.2"));
        assert_eq!(synonyms.canonical("chr2"), None);
        assert!(!synonyms.contains("Chr1"));
    }

    #[test]
    fn test_index_rebuilt_after_deserialize() {
        let synonyms = ContigSynonyms::new("GCA_1", vec![chr1()]);
        let json = serde_json::to_string(&synonyms).unwrap();
        let mut loaded: ContigSynonyms = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.canonical("chr1"), None);
        loaded.rebuild_index();
        assert_eq!(loaded.canonical("chr1"), Some("CM000663.2"));
    }

    #[test]
    fn test_sequence_role_parse() {
        assert_eq!(
            SequenceRole::parse("Assembled-Molecule"),
            SequenceRole::AssembledMolecule
        );
        assert_eq!(SequenceRole::parse("whatever"), SequenceRole::Unknown);
    }
}
