use std::path::Path;

use crate::lifecycle::RemapEntry;
use crate::parsing::ParseError;
use crate::utils::validation::normalize_allele;

/// Parse a remap mapping file with columns: ss_accession, contig, start, [ref, alt]
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or other parse errors
/// if the content is invalid.
pub fn parse_mapping_file(path: &Path) -> Result<Vec<RemapEntry>, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_mapping_text(&content)
}

/// Parse remap mapping text (tab-separated).
///
/// Accessions may carry an `ss` prefix. The whole file is rejected on the
/// first malformed line.
///
/// # Errors
///
/// Returns `ParseError::InvalidRecord` for malformed lines and
/// `ParseError::InvalidFormat` if no entries are found.
pub fn parse_mapping_text(text: &str) -> Result<Vec<RemapEntry>, ParseError> {
    let mut entries = Vec::new();
    let mut first_data_line = true;

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();

        if first_data_line {
            first_data_line = false;
            let first = fields.first().map(|s| s.to_lowercase()).unwrap_or_default();
            if first == "ss_accession" || first == "accession" || first == "ss" {
                continue;
            }
        }

        let line_num = i + 1;
        let invalid = |message: String| ParseError::InvalidRecord {
            line: line_num,
            message,
        };

        if fields.len() != 3 && fields.len() != 5 {
            return Err(invalid(format!(
                "expected 3 or 5 fields, found {}",
                fields.len()
            )));
        }

        let accession = fields[0];
        let digits = accession
            .strip_prefix("ss")
            .or_else(|| accession.strip_prefix("SS"))
            .unwrap_or(accession);
        let ss_accession: u64 = digits
            .parse()
            .map_err(|_| invalid(format!("invalid accession '{accession}'")))?;
        let start: u64 = fields[2]
            .parse()
            .map_err(|_| invalid(format!("invalid start '{}'", fields[2])))?;

        entries.push(RemapEntry {
            ss_accession,
            contig: fields[1].to_string(),
            start,
            reference_allele: fields.get(3).map(|a| normalize_allele(a)),
            alternate_allele: fields.get(4).map(|a| normalize_allele(a)),
        });
    }

    if entries.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No entries found in mapping file".to_string(),
        ));
    }
    Ok(entries)
}
