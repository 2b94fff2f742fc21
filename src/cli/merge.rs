use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::accession::GeneratorSettings;
use crate::cli::{default_instance_id, load_keys, open_store, OutputFormat};
use crate::clustering::{ClusteringEngine, RekeyReport};
use crate::store::RecordStore;

#[derive(Args)]
pub struct MergeDuplicatesArgs {
    /// Store snapshot file
    #[arg(long, required = true)]
    pub store: PathBuf,

    /// Assembly whose clusters are checked
    #[arg(long, required = true)]
    pub assembly: String,

    /// NCBI assembly report providing contig synonyms
    #[arg(long)]
    pub assembly_report: Option<PathBuf>,

    /// Also correct stale cluster keys and split diverging members
    #[arg(long)]
    pub rekey: bool,

    /// Instance id owning blocks reserved for split clusters
    #[arg(long)]
    pub instance_id: Option<String>,

    /// Job run id recorded on the reserved blocks
    #[arg(long, default_value = "merge-duplicates")]
    pub job_run_id: String,
}

#[derive(Serialize)]
struct MergeOutput {
    assembly: String,
    #[serde(flatten)]
    changes: RekeyReport,
}

/// Merge active clusters sharing a clustering key
///
/// # Errors
///
/// Returns an error if the store, assembly report, or a merge fails.
pub fn run(args: MergeDuplicatesArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let store = open_store(&args.store)?;
    let keys = load_keys(args.assembly_report.as_deref(), Some(&args.assembly))?;
    let instance = args
        .instance_id
        .clone()
        .unwrap_or_else(|| default_instance_id("merge"));
    let mut engine = ClusteringEngine::new(
        store.clone(),
        GeneratorSettings::new(instance, args.job_run_id.as_str()),
        keys,
    );

    let changes = if args.rekey {
        engine.rekey(&args.assembly)?
    } else {
        RekeyReport {
            merged: engine.merge_duplicates(&args.assembly)?,
            ..RekeyReport::default()
        }
    };
    engine.generator_mut().commit()?;
    store.flush()?;

    if verbose {
        eprintln!("{:?}", engine.stats());
    }

    match format {
        OutputFormat::Text => {
            println!(
                "{}: {} cluster(s) merged, {} re-keyed, {} received split members",
                args.assembly,
                changes.merged.len(),
                changes.rekeyed.len(),
                changes.split_into.len()
            );
            for rs in &changes.merged {
                let target = engine.resolve(*rs)?.map(|c| c.accession);
                match target {
                    Some(target) => println!("  rs{rs} -> rs{target}"),
                    None => println!("  rs{rs}"),
                }
            }
        }
        OutputFormat::Json => {
            let output = MergeOutput {
                assembly: args.assembly,
                changes,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Tsv => {
            println!("accession\tchange");
            for rs in &changes.merged {
                println!("{rs}\tmerged");
            }
            for rs in &changes.rekeyed {
                println!("{rs}\trekeyed");
            }
            for rs in &changes.split_into {
                println!("{rs}\tsplit_into");
            }
        }
    }
    Ok(())
}
