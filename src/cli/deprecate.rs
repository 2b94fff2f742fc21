use std::path::PathBuf;

use clap::{ArgGroup, Args};

use crate::cli::{open_store, parse_accession, OutputFormat};
use crate::lifecycle::deprecation::INVALID_ALLELES_REASON;
use crate::lifecycle::{DeprecationEngine, DeprecationReport};
use crate::store::RecordStore;

#[derive(Args)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["accession", "cluster", "project", "invalid_alleles", "orphans"])
))]
pub struct DeprecateArgs {
    /// Store snapshot file
    #[arg(long, required = true)]
    pub store: PathBuf,

    /// Assembly the deprecation applies to (project, allele and orphan modes)
    #[arg(long, required_unless_present_any = ["accession", "cluster"])]
    pub assembly: Option<String>,

    /// Submitted variant accession(s) to deprecate (e.g., "ss5000000001")
    #[arg(long, num_args = 1.., value_parser = parse_accession)]
    pub accession: Vec<u64>,

    /// Clustered variant accession(s) to deprecate (e.g., "rs3000000000")
    #[arg(long, num_args = 1.., value_parser = parse_accession)]
    pub cluster: Vec<u64>,

    /// Deprecate every submitted variant of this project
    #[arg(long)]
    pub project: Option<String>,

    /// Deprecate submitted variants whose alleles fall outside A, C, G, T, N
    #[arg(long)]
    pub invalid_alleles: bool,

    /// Deprecate active clusters that no longer have an active member
    #[arg(long)]
    pub orphans: bool,

    /// Reason recorded on every deprecated record
    #[arg(long, required_unless_present = "invalid_alleles")]
    pub reason: Option<String>,
}

/// Run a deprecation request
///
/// # Errors
///
/// Returns an error if the store cannot be opened, an accession is unknown,
/// or the store fails.
pub fn run(args: DeprecateArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let store = open_store(&args.store)?;
    let engine = DeprecationEngine::new(store.clone());
    let reason = args.reason.as_deref().unwrap_or(INVALID_ALLELES_REASON);

    let assembly = || {
        args.assembly
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--assembly is required for this deprecation"))
    };

    let report = if !args.accession.is_empty() {
        engine.deprecate_submitted(&args.accession, reason)?
    } else if let Some(project) = &args.project {
        engine.deprecate_project(assembly()?, project, reason)?
    } else if args.invalid_alleles {
        engine.deprecate_invalid_alleles(assembly()?)?
    } else if !args.cluster.is_empty() {
        let mut report = DeprecationReport::default();
        for &rs in &args.cluster {
            let cascaded = engine.deprecate_cluster(rs, reason)?;
            report.submitted_deprecated.extend(cascaded.submitted_deprecated);
            report.clusters_deprecated.extend(cascaded.clusters_deprecated);
        }
        report
    } else {
        engine.deprecate_orphan_clusters(assembly()?, reason)?
    };
    store.flush()?;

    if verbose {
        eprintln!("Reason: {reason}");
    }

    match format {
        OutputFormat::Text => {
            println!(
                "Deprecated {} submitted variant(s) and {} clustered variant(s)",
                report.submitted_deprecated.len(),
                report.clusters_deprecated.len()
            );
            for accession in &report.submitted_deprecated {
                println!("  ss{accession}");
            }
            for accession in &report.clusters_deprecated {
                println!("  rs{accession}");
            }
            if !report.unchanged.is_empty() {
                println!("{} already deprecated", report.unchanged.len());
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Tsv => {
            println!("category\taccession\tchange");
            for accession in &report.submitted_deprecated {
                println!("ss\t{accession}\tdeprecated");
            }
            for accession in &report.clusters_deprecated {
                println!("rs\t{accession}\tdeprecated");
            }
            for accession in &report.unchanged {
                println!("ss\t{accession}\tunchanged");
            }
        }
    }
    Ok(())
}
