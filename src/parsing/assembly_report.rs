//! Parser for NCBI assembly report files.
//!
//! NCBI assembly reports list every naming convention of each sequence. The
//! key columns are:
//!
//! - Sequence-Name: The primary name (e.g., "1", "X", "MT")
//! - GenBank-Accn: GenBank accession (e.g., "CM000663.2")
//! - RefSeq-Accn: RefSeq accession (e.g., "NC_000001.11")
//! - UCSC-style-name: UCSC-style name (e.g., "chr1")
//! - Sequence-Length: Length in base pairs
//!
//! The GenBank accession is the canonical name used in clustering keys; the
//! sequence name stands in when a sequence has none. Every other name becomes
//! an alias.

use std::collections::HashMap;
use std::path::Path;

use crate::core::contig::{ContigEntry, ContigSynonyms, SequenceRole};
use crate::parsing::{ParseError, MAX_CONTIGS};

/// Header line announcing the assembly's own accession
const ASSEMBLY_ACCESSION_HEADER: &str = "genbank assembly accession:";

/// One row of an assembly report
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub sequence_name: String,
    pub length: Option<u64>,
    pub genbank_accn: Option<String>,
    pub refseq_accn: Option<String>,
    pub ucsc_name: Option<String>,
    pub role: Option<String>,
}

impl ReportRow {
    /// Name used in clustering keys
    pub fn canonical(&self) -> &str {
        self.genbank_accn.as_deref().unwrap_or(&self.sequence_name)
    }

    pub fn to_entry(&self) -> ContigEntry {
        let canonical = self.canonical().to_string();
        let mut aliases: Vec<String> = Vec::new();
        for name in [
            Some(&self.sequence_name),
            self.genbank_accn.as_ref(),
            self.refseq_accn.as_ref(),
            self.ucsc_name.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            if *name != canonical && !aliases.contains(name) {
                aliases.push(name.clone());
            }
        }

        ContigEntry {
            canonical,
            aliases,
            length: self.length,
            role: self
                .role
                .as_deref()
                .map_or(SequenceRole::Unknown, SequenceRole::parse),
        }
    }
}

/// Parsed assembly report
#[derive(Debug, Clone)]
pub struct AssemblyReport {
    /// From the `# GenBank assembly accession:` header, when present
    pub assembly_accession: Option<String>,
    pub rows: Vec<ReportRow>,
}

impl AssemblyReport {
    /// Synonym table for `assembly`, or for the report's own accession
    ///
    /// # Errors
    ///
    /// Returns `ParseError::InvalidFormat` if neither is known.
    pub fn into_synonyms(self, assembly: Option<&str>) -> Result<ContigSynonyms, ParseError> {
        let accession = assembly
            .map(str::to_string)
            .or(self.assembly_accession)
            .ok_or_else(|| {
                ParseError::InvalidFormat(
                    "Assembly accession not given and not found in report header".to_string(),
                )
            })?;
        let entries = self.rows.iter().map(ReportRow::to_entry).collect();
        Ok(ContigSynonyms::new(accession, entries))
    }
}

/// Read an assembly report file into a synonym table
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or other parse errors
/// if the content is invalid.
pub fn parse_assembly_report_file(
    path: &Path,
    assembly: Option<&str>,
) -> Result<ContigSynonyms, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_assembly_report_text(&content)?.into_synonyms(assembly)
}

/// Parse NCBI assembly report text
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` if the header or required columns are
/// missing, a length is invalid, or no sequences are listed, and
/// `ParseError::TooManyContigs` above [`MAX_CONTIGS`].
pub fn parse_assembly_report_text(text: &str) -> Result<AssemblyReport, ParseError> {
    let mut rows = Vec::new();
    let mut assembly_accession = None;
    // Lowercase keys for case-insensitive matching
    let mut header_map: HashMap<String, usize> = HashMap::new();
    let mut found_header = false;

    for line in text.lines() {
        if line.starts_with('#') {
            let line_lower = line.to_ascii_lowercase();
            if line_lower.contains("sequence-name") {
                let header_line = line.trim_start_matches('#').trim();
                for (idx, col) in header_line.split('\t').enumerate() {
                    header_map.insert(col.trim().to_lowercase(), idx);
                }
                found_header = true;
            } else if let Some(pos) = line_lower.find(ASSEMBLY_ACCESSION_HEADER) {
                let value = line[pos + ASSEMBLY_ACCESSION_HEADER.len()..].trim();
                if let Some(accession) = value.split_whitespace().next() {
                    assembly_accession = Some(accession.to_string());
                }
            }
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        if !found_header {
            return Err(ParseError::InvalidFormat(
                "NCBI assembly report header not found".to_string(),
            ));
        }

        let seq_name_idx = *header_map
            .get("sequence-name")
            .ok_or_else(|| ParseError::InvalidFormat("Missing Sequence-Name column".to_string()))?;

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() <= seq_name_idx {
            continue;
        }

        let get_optional = |name: &str| -> Option<String> {
            header_map
                .get(name)
                .and_then(|&idx| fields.get(idx))
                .map(|s| s.trim())
                .filter(|s| !s.is_empty() && *s != "na")
                .map(str::to_string)
        };

        let sequence_name = fields[seq_name_idx].trim().to_string();
        let length = match get_optional("sequence-length") {
            None => None,
            Some(value) => Some(value.parse::<u64>().map_err(|_| {
                ParseError::InvalidFormat(format!(
                    "Invalid length for '{sequence_name}': {value}"
                ))
            })?),
        };

        if rows.len() >= MAX_CONTIGS {
            return Err(ParseError::TooManyContigs(rows.len()));
        }

        rows.push(ReportRow {
            length,
            genbank_accn: get_optional("genbank-accn"),
            refseq_accn: get_optional("refseq-accn"),
            ucsc_name: get_optional("ucsc-style-name"),
            role: get_optional("sequence-role"),
            sequence_name,
        });
    }

    if rows.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No sequences found in NCBI assembly report".to_string(),
        ));
    }

    Ok(AssemblyReport {
        assembly_accession,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "# Assembly name:  GRCh38.p14
# Organism name:  Homo sapiens
# GenBank assembly accession: GCA_000001405.29
# Sequence-Name\tSequence-Role\tAssigned-Molecule\tAssigned-Molecule-Location/Type\tGenBank-Accn\tRelationship\tRefSeq-Accn\tAssembly-Unit\tSequence-Length\tUCSC-style-name
1\tassembled-molecule\t1\tChromosome\tCM000663.2\t=\tNC_000001.11\tPrimary Assembly\t248956422\tchr1
MT\tassembled-molecule\tMT\tMitochondrion\tJ01415.2\t=\tNC_012920.1\tnon-nuclear\t16569\tchrM
HSCHR1_CTG1_UNLOCALIZED\tunlocalized-scaffold\t1\tChromosome\tna\t<>\tNT_187361.1\tPrimary Assembly\tna\tna
";

    #[test]
    fn test_parse_assembly_report() {
        let report = parse_assembly_report_text(REPORT).unwrap();
        assert_eq!(report.assembly_accession.as_deref(), Some("GCA_000001405.29"));
        assert_eq!(report.rows.len(), 3);

        let chr1 = &report.rows[0];
        assert_eq!(chr1.sequence_name, "1");
        assert_eq!(chr1.length, Some(248_956_422));
        assert_eq!(chr1.canonical(), "CM000663.2");
        assert_eq!(chr1.ucsc_name.as_deref(), Some("chr1"));

        // No GenBank accession: the sequence name is canonical
        let unlocalized = &report.rows[2];
        assert_eq!(unlocalized.canonical(), "HSCHR1_CTG1_UNLOCALIZED");
        assert_eq!(unlocalized.length, None);
    }

    #[test]
    fn test_report_to_synonyms() {
        let synonyms = parse_assembly_report_text(REPORT)
            .unwrap()
            .into_synonyms(None)
            .unwrap();
        assert_eq!(synonyms.assembly_accession, "GCA_000001405.29");
        for name in ["1", "chr1", "NC_000001.11", "CM000663.2"] {
            assert_eq!(synonyms.canonical(name), Some("CM000663.2"));
        }
        assert_eq!(synonyms.canonical("chrM"), Some("J01415.2"));
        assert_eq!(synonyms.canonical("NT_187361.1"), Some("HSCHR1_CTG1_UNLOCALIZED"));
        assert_eq!(synonyms.entries[0].aliases.len(), 3);
        assert_eq!(synonyms.entries[0].role, SequenceRole::AssembledMolecule);
    }

    #[test]
    fn test_explicit_assembly_overrides_header() {
        let synonyms = parse_assembly_report_text(REPORT)
            .unwrap()
            .into_synonyms(Some("GCA_X"))
            .unwrap();
        assert_eq!(synonyms.assembly_accession, "GCA_X");
    }

    #[test]
    fn test_parse_assembly_report_no_header() {
        let report = "1\tassembled-molecule\t1\t248956422\n";
        assert!(parse_assembly_report_text(report).is_err());
    }

    #[test]
    fn test_missing_assembly_accession() {
        let report = "# Sequence-Name\tGenBank-Accn\n1\tCM000663.2\n";
        let parsed = parse_assembly_report_text(report).unwrap();
        assert!(matches!(
            parsed.into_synonyms(None),
            Err(ParseError::InvalidFormat(_))
        ));
    }
}
