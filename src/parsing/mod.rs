//! Readers for the engine's file inputs.
//!
//! - **Variant tables** ([`variants`]): pre-parsed TSV/CSV records with
//!   columns `contig, start, ref, alt[, project]`, optionally gzip-compressed
//! - **NCBI assembly reports** ([`assembly_report`]): contig synonym tables
//! - **Remap mappings** ([`mapping`]): new coordinates of submitted variants
//!
//! ## Example
//!
//! ```rust,no_run
//! use variant_accession::parsing::variants::open_variants;
//! use std::path::Path;
//!
//! for record in open_variants(Path::new("study.tsv.gz")).unwrap() {
//!     match record {
//!         Ok(variant) => println!("{}:{}", variant.contig, variant.start),
//!         Err(e) => eprintln!("skipping: {e}"),
//!     }
//! }
//! ```

pub mod assembly_report;
pub mod mapping;
pub mod variants;

use thiserror::Error;

/// Upper bound on the contigs accepted from one assembly report
pub const MAX_CONTIGS: usize = 100_000;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Line {line}: {message}")]
    InvalidRecord { line: usize, message: String },

    #[error("Too many contigs: {0} exceeds maximum allowed ({MAX_CONTIGS})")]
    TooManyContigs(usize),
}

impl ParseError {
    /// Errors confined to a single input line
    #[must_use]
    pub fn is_record_scoped(&self) -> bool {
        matches!(self, Self::InvalidRecord { .. })
    }
}
