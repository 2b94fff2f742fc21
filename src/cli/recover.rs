use std::path::PathBuf;

use chrono::Utc;
use clap::Args;

use crate::accession::GeneratorSettings;
use crate::cli::{default_instance_id, load_keys, open_store, parse_category, OutputFormat};
use crate::clustering::ClusteringEngine;
use crate::core::types::Category;
use crate::recovery::{cutoff_from_days, RecoveryAgent, RecoveryReport};
use crate::store::RecordStore;

#[derive(Args)]
pub struct RecoverArgs {
    /// Store snapshot file
    #[arg(long, required = true)]
    pub store: PathBuf,

    /// Category to recover (ss or rs); both when omitted
    #[arg(long, value_parser = parse_category)]
    pub category: Option<Category>,

    /// Blocks of this run are recovered whatever their age
    #[arg(long, required = true)]
    pub job_run_id: String,

    /// Recover blocks untouched for at least this many days
    #[arg(long, default_value = "7")]
    pub cutoff_days: u64,

    /// Recover every unfinished block now, however recent
    #[arg(long, conflicts_with = "cutoff_days")]
    pub all: bool,

    /// NCBI assembly report used when re-clustering recovered variants
    #[arg(long)]
    pub assembly_report: Option<PathBuf>,

    /// Instance id for accessions drawn while re-clustering
    #[arg(long)]
    pub instance_id: Option<String>,
}

/// Run recovery for the requested categories
///
/// # Errors
///
/// Returns an error if the store cannot be opened or recovery fails.
pub fn run(args: RecoverArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let store = open_store(&args.store)?;
    let keys = load_keys(args.assembly_report.as_deref(), None)?;
    let cutoff = if args.all {
        Utc::now()
    } else {
        cutoff_from_days(args.cutoff_days)
    };
    if verbose {
        eprintln!("Recovering blocks last updated before {cutoff}");
    }

    let instance = args
        .instance_id
        .clone()
        .unwrap_or_else(|| default_instance_id("recover"));
    let clustering = ClusteringEngine::new(
        store.clone(),
        GeneratorSettings::new(instance, args.job_run_id.as_str()),
        keys,
    );
    let mut agent = RecoveryAgent::new(store.clone(), clustering);

    let categories = match args.category {
        Some(category) => vec![category],
        None => vec![Category::Ss, Category::Rs],
    };
    let mut reports = Vec::with_capacity(categories.len());
    for category in categories {
        reports.push(agent.run_recovery(category, &args.job_run_id, cutoff)?);
    }
    store.flush()?;

    match format {
        OutputFormat::Text => print_text_reports(&reports),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Tsv => {
            println!("category\tblocks_recovered\tcommitted_found\tretired_ranges\tretired_numbers\treclustered\trecluster_failures");
            for r in &reports {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    r.category,
                    r.blocks_recovered,
                    r.committed_found,
                    r.retired.len(),
                    r.retired_numbers(),
                    r.reclustered,
                    r.recluster_failures
                );
            }
        }
    }
    Ok(())
}

fn print_text_reports(reports: &[RecoveryReport]) {
    for report in reports {
        if report.blocks_recovered == 0 {
            println!("{}: nothing to recover", report.category);
            continue;
        }
        println!(
            "{}: recovered {} block(s), {} row(s) found, {} number(s) retired",
            report.category,
            report.blocks_recovered,
            report.committed_found,
            report.retired_numbers()
        );
        for range in &report.retired {
            println!("  retired [{}, {}) from {}", range.start, range.end, range.block_id);
        }
        if report.reclustered > 0 || report.recluster_failures > 0 {
            println!(
                "  re-clustered {} submitted variant(s), {} failure(s)",
                report.reclustered, report.recluster_failures
            );
        }
    }
}
