use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::core::variant::VariantSubmission;
use crate::parsing::ParseError;
use crate::utils::validation::normalize_allele;

/// First-column names that mark a header row
const HEADER_NAMES: [&str; 5] = ["contig", "chrom", "#chrom", "chr", "seqname"];

/// One pre-parsed input row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRecord {
    /// 1-based line number in the input
    pub line: usize,
    pub contig: String,
    pub start: u64,
    pub reference_allele: String,
    pub alternate_allele: String,
    /// Per-row project, overriding the job's project
    pub project: Option<String>,
}

impl VariantRecord {
    #[must_use]
    pub fn into_submission(self, assembly: &str, default_project: &str) -> VariantSubmission {
        VariantSubmission::new(
            assembly,
            self.project.as_deref().unwrap_or(default_project),
            self.contig,
            self.start,
            self.reference_allele,
            self.alternate_allele,
        )
    }
}

/// Streaming reader over `contig, start, ref, alt[, project]` rows.
///
/// The delimiter (tab or comma) is detected from the first data row. Blank
/// lines and `#` comments are skipped, as is a header row. Malformed rows are
/// yielded as [`ParseError::InvalidRecord`] so that callers can skip them.
pub struct VariantReader<R> {
    lines: Lines<R>,
    line: usize,
    delimiter: Option<char>,
}

impl<R: BufRead> VariantReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            delimiter: None,
        }
    }

    fn parse_line(&mut self, text: &str) -> Option<Result<VariantRecord, ParseError>> {
        let trimmed = text.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() {
            return None;
        }

        let first_data_line = self.delimiter.is_none();
        let delimiter = *self
            .delimiter
            .get_or_insert(if trimmed.contains('\t') { '\t' } else { ',' });
        let fields: Vec<&str> = trimmed.split(delimiter).map(str::trim).collect();

        if first_data_line {
            let first = fields.first().map(|s| s.to_lowercase()).unwrap_or_default();
            if HEADER_NAMES.contains(&first.as_str()) {
                return None;
            }
        }
        if trimmed.starts_with('#') {
            return None;
        }

        Some(self.record(&fields))
    }

    fn record(&self, fields: &[&str]) -> Result<VariantRecord, ParseError> {
        let invalid = |message: String| ParseError::InvalidRecord {
            line: self.line,
            message,
        };

        if fields.len() < 4 {
            return Err(invalid(format!(
                "expected at least 4 fields, found {}",
                fields.len()
            )));
        }
        let start: u64 = fields[1]
            .parse()
            .map_err(|_| invalid(format!("invalid start '{}'", fields[1])))?;

        Ok(VariantRecord {
            line: self.line,
            contig: fields[0].to_string(),
            start,
            reference_allele: normalize_allele(fields[2]),
            alternate_allele: normalize_allele(fields[3]),
            project: fields
                .get(4)
                .filter(|p| !p.is_empty())
                .map(|p| (*p).to_string()),
        })
    }
}

impl<R: BufRead> Iterator for VariantReader<R> {
    type Item = Result<VariantRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            // Comments before the first data row do not fix the delimiter
            if self.delimiter.is_none() && text.starts_with('#') && !is_header(&text) {
                continue;
            }
            if let Some(result) = self.parse_line(&text) {
                return Some(result);
            }
        }
    }
}

fn is_header(text: &str) -> bool {
    text.split(['\t', ','])
        .next()
        .is_some_and(|first| HEADER_NAMES.contains(&first.trim().to_lowercase().as_str()))
}

/// Open a variant table, decompressing `.gz` files
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be opened.
pub fn open_variants(path: &Path) -> Result<VariantReader<Box<dyn BufRead + Send>>, ParseError> {
    let file = File::open(path)?;
    let is_gzip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"));

    let reader: Box<dyn BufRead + Send> = if is_gzip {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(VariantReader::new(reader))
}

/// Parse variant table text, collecting every row
pub fn parse_variants_text(text: &str) -> Vec<Result<VariantRecord, ParseError>> {
    VariantReader::new(text.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_parse_tsv_with_header() {
        let tsv = "contig\tstart\tref\talt\tproject
1\t100\tA\tT\tPRJ1
1\t200\tac\t-
";
        let records: Vec<VariantRecord> = parse_variants_text(tsv)
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].project.as_deref(), Some("PRJ1"));
        assert_eq!(records[0].line, 2);
        assert_eq!(records[1].reference_allele, "AC");
        assert_eq!(records[1].alternate_allele, "");
        assert_eq!(records[1].project, None);
    }

    #[test]
    fn test_parse_csv_without_header() {
        let csv = "chr1,100,A,G\nchr1,101,.,T\n";
        let records = parse_variants_text(csv);
        assert_eq!(records.len(), 2);
        let second = records[1].as_ref().unwrap();
        assert_eq!(second.reference_allele, "");
        assert_eq!(second.contig, "chr1");
    }

    #[test]
    fn test_comments_before_header() {
        let tsv = "# exported 2024-01-01
# another comment

#chrom\tpos\tref\talt
1\t100\tA\tT
";
        let records = parse_variants_text(tsv);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().line, 5);
    }

    #[test]
    fn test_malformed_rows_are_reported_not_fatal() {
        let tsv = "1\t100\tA\tT\n1\tabc\tA\tT\n1\t100\n1\t300\tC\tG\n";
        let records = parse_variants_text(tsv);
        assert_eq!(records.len(), 4);
        assert!(records[0].is_ok());
        assert!(matches!(
            records[1],
            Err(ParseError::InvalidRecord { line: 2, .. })
        ));
        assert!(records[2].as_ref().unwrap_err().is_record_scoped());
        assert_eq!(records[3].as_ref().unwrap().start, 300);
    }

    #[test]
    fn test_into_submission_uses_default_project() {
        let record = parse_variants_text("1\t100\tA\tT\n").remove(0).unwrap();
        let submission = record.into_submission("GCA_1", "PRJ_DEFAULT");
        assert_eq!(submission.project_accession, "PRJ_DEFAULT");
        assert_eq!(submission.reference_sequence_accession, "GCA_1");
    }

    #[test]
    fn test_open_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("variants.tsv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"1\t100\tA\tT\n2\t200\tG\tC\n").unwrap();
        encoder.finish().unwrap();

        let records: Vec<_> = open_variants(&path).unwrap().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].as_ref().unwrap().contig, "2");
    }
}
