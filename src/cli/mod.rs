//! Command-line interface for variant-accession.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **accession**: Accession and cluster a file of variant records
//! - **recover**: Reclaim blocks abandoned by crashed jobs
//! - **deprecate**: Deprecate submitted variants and the clusters they leave empty
//! - **remap**: Carry submitted variants into a new assembly
//! - **merge-duplicates**: Merge active clusters that share a clustering key
//! - **show**: Print a record and its event history
//!
//! ## Usage
//!
//! ```text
//! # Accession a tab-separated file into a snapshot store
//! variant-accession accession variants.tsv --store store.json \
//!     --assembly GCA_000001405.15 --project PRJEB1234
//!
//! # Skip invalid rows instead of failing
//! variant-accession accession variants.tsv.gz --store store.json \
//!     --assembly GCA_000001405.15 --project PRJEB1234 --force-import
//!
//! # Inspect a cluster as JSON
//! variant-accession --format json show --store store.json --category rs 3000000000
//! ```
//!
//! All state lives in the `--store` snapshot file, which is rewritten after
//! every committed chunk.

use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;

use crate::clustering::KeyDeriver;
use crate::core::types::Category;
use crate::parsing::assembly_report::parse_assembly_report_file;
use crate::store::MemoryStore;

pub mod accession;
pub mod deprecate;
pub mod merge;
pub mod recover;
pub mod remap;
pub mod show;

#[derive(Parser)]
#[command(name = "variant-accession")]
#[command(version)]
#[command(about = "Assign stable accessions to genomic variants and cluster them")]
#[command(
    long_about = "variant-accession assigns permanent, never-reused accessions to submitted variants (ss) and groups submissions of the same variant into clustered variants (rs).\n\nIdentical submissions always resolve to the same accession, concurrent workers draw from disjoint accession blocks, and every change to a record is kept as an event."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Accession and cluster a file of variant records
    Accession(accession::AccessionArgs),

    /// Reclaim accession blocks left unfinished by crashed jobs
    Recover(recover::RecoverArgs),

    /// Deprecate submitted variants
    Deprecate(deprecate::DeprecateArgs),

    /// Remap submitted variants into another assembly
    Remap(remap::RemapArgs),

    /// Merge active clusters that share a clustering key
    MergeDuplicates(merge::MergeDuplicatesArgs),

    /// Show a submitted or clustered variant with its history
    Show(show::ShowArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Parse an accession, with or without its `ss`/`rs` prefix
pub(crate) fn parse_accession(value: &str) -> Result<u64, String> {
    let digits = value
        .get(..2)
        .filter(|prefix| Category::parse(prefix).is_some())
        .map_or(value, |_| &value[2..]);
    digits
        .parse()
        .map_err(|_| format!("'{value}' is not an accession number"))
}

pub(crate) fn parse_category(value: &str) -> Result<Category, String> {
    Category::parse(value).ok_or_else(|| format!("unknown category '{value}' (expected ss or rs)"))
}

/// Instance id used when none is given
pub(crate) fn default_instance_id(command: &str) -> String {
    format!("{command}-{}", std::process::id())
}

pub(crate) fn open_store(path: &Path) -> anyhow::Result<Arc<MemoryStore>> {
    Ok(Arc::new(MemoryStore::open(path)?))
}

/// Clustering key deriver, with the synonyms of an assembly report if given
pub(crate) fn load_keys(
    assembly_report: Option<&Path>,
    assembly: Option<&str>,
) -> anyhow::Result<Arc<KeyDeriver>> {
    let mut keys = KeyDeriver::new();
    if let Some(path) = assembly_report {
        if !path.exists() {
            anyhow::bail!("Assembly report not found: {}", path.display());
        }
        let synonyms = parse_assembly_report_file(path, assembly)?;
        tracing::info!(
            "Loaded {} sequences for {} from {}",
            synonyms.len(),
            synonyms.assembly_accession,
            path.display()
        );
        keys.add_synonyms(synonyms);
    }
    Ok(Arc::new(keys))
}
