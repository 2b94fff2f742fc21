use std::path::PathBuf;

use clap::Args;

use crate::accession::{AccessionGenerator, GeneratorSettings};
use crate::cli::{default_instance_id, load_keys, open_store, OutputFormat};
use crate::clustering::ClusteringEngine;
use crate::core::types::Category;
use crate::lifecycle::RemappingEngine;
use crate::parsing::mapping::parse_mapping_file;
use crate::store::RecordStore;

#[derive(Args)]
pub struct RemapArgs {
    /// Store snapshot file
    #[arg(long, required = true)]
    pub store: PathBuf,

    /// Tab-separated mapping: ss_accession, contig, start[, ref, alt]
    #[arg(long, required = true)]
    pub mapping: PathBuf,

    /// Assembly the variants are remapped into
    #[arg(long, required = true)]
    pub target_assembly: String,

    /// NCBI assembly report of the target assembly
    #[arg(long)]
    pub assembly_report: Option<PathBuf>,

    /// Instance id owning the reserved blocks
    #[arg(long)]
    pub instance_id: Option<String>,

    /// Job run id recorded on the reserved blocks
    #[arg(long, default_value = "remap")]
    pub job_run_id: String,

    /// Accessions per reserved block
    #[arg(long, default_value = "1000")]
    pub block_size: u64,
}

/// Remap the submitted variants listed in the mapping file
///
/// # Errors
///
/// Returns an error if the mapping or store cannot be read, or the store fails.
pub fn run(args: RemapArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    if !args.mapping.exists() {
        anyhow::bail!("Mapping file not found: {}", args.mapping.display());
    }
    let entries = parse_mapping_file(&args.mapping)?;
    if verbose {
        eprintln!(
            "Remapping {} submitted variant(s) into {}",
            entries.len(),
            args.target_assembly
        );
    }

    let store = open_store(&args.store)?;
    let keys = load_keys(args.assembly_report.as_deref(), Some(&args.target_assembly))?;
    let instance = args
        .instance_id
        .clone()
        .unwrap_or_else(|| default_instance_id("remap"));
    let settings = GeneratorSettings::new(instance, args.job_run_id.as_str())
        .with_block_size(args.block_size);

    let submitted = AccessionGenerator::new(store.clone(), Category::Ss, settings.clone());
    let clustering = ClusteringEngine::new(store.clone(), settings, keys);
    let mut engine = RemappingEngine::new(store.clone(), submitted, clustering);
    let report = engine.remap(&entries, &args.target_assembly)?;
    store.flush()?;

    match format {
        OutputFormat::Text => {
            println!(
                "Remapped {} submitted variant(s) into {}",
                report.remapped.len(),
                args.target_assembly
            );
            for r in &report.remapped {
                println!(
                    "  ss{} -> ss{} (rs{})",
                    r.source, r.target, r.clustered_variant_accession
                );
            }
            if !report.skipped.is_empty() {
                println!("Skipped {}:", report.skipped.len());
                for skip in &report.skipped {
                    println!("  ss{}: {}", skip.ss_accession, skip.reason);
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Tsv => {
            println!("source\ttarget\tclustered_variant\toutcome");
            for r in &report.remapped {
                println!(
                    "{}\t{}\t{}\t{:?}",
                    r.source, r.target, r.clustered_variant_accession, r.outcome
                );
            }
            for skip in &report.skipped {
                println!("{}\t\t\tskipped: {}", skip.ss_accession, skip.reason);
            }
        }
    }
    Ok(())
}
