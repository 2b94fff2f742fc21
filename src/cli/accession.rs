use serde::Serialize;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Args;
use tracing::warn;

use crate::cli::{load_keys, open_store, OutputFormat};
use crate::core::types::Archive;
use crate::parsing::variants::{open_variants, VariantReader};
use crate::pipeline::{run_job, JobConfig, JobReport, JobStatus};

/// Archive receiving newly accessioned variants
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum LoadTo {
    Eva,
    Dbsnp,
}

impl From<LoadTo> for Archive {
    fn from(value: LoadTo) -> Self {
        match value {
            LoadTo::Eva => Archive::Eva,
            LoadTo::Dbsnp => Archive::Dbsnp,
        }
    }
}

#[derive(Args)]
pub struct AccessionArgs {
    /// Variant records (contig, start, ref, alt[, project]); TSV or CSV,
    /// optionally gzipped. Use '-' for stdin
    #[arg(required = true)]
    pub input: PathBuf,

    /// Store snapshot file (created if missing)
    #[arg(long, required = true)]
    pub store: PathBuf,

    /// Job configuration file (JSON); flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Assembly accession of the input (e.g., "GCA_000001405.15")
    #[arg(long)]
    pub assembly: Option<String>,

    /// Project accession for rows that do not name one
    #[arg(long)]
    pub project: Option<String>,

    /// NCBI assembly report providing contig synonyms
    #[arg(long)]
    pub assembly_report: Option<PathBuf>,

    /// Records per chunk
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Parallel worker lanes
    #[arg(long)]
    pub workers: Option<usize>,

    /// Skip invalid records instead of failing on the first one
    #[arg(long)]
    pub force_import: bool,

    /// Recover every unfinished block before starting, whatever its age
    #[arg(long)]
    pub force_restart: bool,

    /// Archive receiving the new submitted variants
    #[arg(long, value_enum)]
    pub load_to: Option<LoadTo>,

    /// Instance id owning the reserved blocks
    #[arg(long)]
    pub instance_id: Option<String>,

    /// Job run id (generated by default)
    #[arg(long)]
    pub job_run_id: Option<String>,
}

impl AccessionArgs {
    fn job_config(&self) -> anyhow::Result<JobConfig> {
        let mut config = match &self.config {
            Some(path) => JobConfig::load(path)?,
            None => JobConfig::default(),
        };
        if let Some(assembly) = &self.assembly {
            config.assembly_accession.clone_from(assembly);
        }
        if let Some(project) = &self.project {
            config.project_accession.clone_from(project);
        }
        if let Some(report) = &self.assembly_report {
            config.assembly_report = Some(report.clone());
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(load_to) = self.load_to {
            config.load_to = load_to.into();
        }
        if let Some(instance_id) = &self.instance_id {
            config.instance_id.clone_from(instance_id);
        }
        if let Some(job_run_id) = &self.job_run_id {
            config.job_run_id.clone_from(job_run_id);
        }
        config.force_import |= self.force_import;
        config.force_restart |= self.force_restart;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct JobOutput<'a> {
    status: JobStatus,
    #[serde(flatten)]
    report: &'a JobReport,
}

/// Run an accessioning job and return the process exit code
///
/// # Errors
///
/// Returns an error if the configuration, store, or input cannot be opened
/// or the job cannot start.
pub fn run(args: AccessionArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<i32> {
    let config = args.job_config()?;
    let store = open_store(&args.store)?;
    let keys = load_keys(
        config.assembly_report.as_deref(),
        Some(&config.assembly_accession),
    )?;

    let input = if args.input.as_os_str() == "-" {
        let stdin: Box<dyn BufRead + Send> = Box::new(BufReader::new(std::io::stdin()));
        VariantReader::new(stdin)
    } else {
        if !args.input.exists() {
            anyhow::bail!("Input file not found: {}", args.input.display());
        }
        open_variants(&args.input)?
    };

    if verbose {
        eprintln!(
            "Job {} on {} (instance {}, {} worker(s))",
            config.job_run_id, config.assembly_accession, config.instance_id, config.workers
        );
    }

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async move {
        let stop = Arc::new(AtomicBool::new(false));
        let signal = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight chunks");
                signal.store(true, Ordering::SeqCst);
            }
        });
        run_job(store, config, keys, input, stop).await
    })?;

    let status = report.status();
    match format {
        OutputFormat::Text => print_text_report(&report, status),
        OutputFormat::Json => {
            let output = JobOutput {
                status,
                report: &report,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Tsv => print_tsv_report(&report, status),
    }
    Ok(status.exit_code())
}

fn print_text_report(report: &JobReport, status: JobStatus) {
    println!("Job {}: {}", report.job_run_id, status);
    println!();
    println!("  Records read:     {}", report.records_read);
    println!("  New accessions:   {}", report.accessioned);
    println!("  Already known:    {}", report.existing);
    println!("  Clustered:        {}", report.clustered);
    println!("  New clusters:     {}", report.clustering.created);
    println!("  Merged clusters:  {}", report.clustering.merged);
    println!("  Splits:           {}", report.clustering.split);
    println!("  Chunks committed: {}", report.chunks);

    for recovery in report.recovery.iter().filter(|r| r.blocks_recovered > 0) {
        println!(
            "  Recovered {} block(s) of {} ({} number(s) retired)",
            recovery.blocks_recovered,
            recovery.category,
            recovery.retired_numbers()
        );
    }

    if !report.skipped.is_empty() {
        println!();
        println!("Skipped {} record(s):", report.total_skipped());
        for (reason, count) in &report.skipped {
            println!("  {reason}: {count}");
        }
        for skip in report.skipped_records.iter().take(10) {
            println!("    line {}: {}", skip.line, skip.message);
        }
    }

    if report.interrupted {
        println!();
        println!("Interrupted before the end of the input");
    }
    if let Some(error) = &report.error {
        println!();
        println!("Error: {error}");
    }
}

fn print_tsv_report(report: &JobReport, status: JobStatus) {
    println!("job_run_id\tstatus\tread\taccessioned\texisting\tclustered\tnew_clusters\tmerged\tsplit\tskipped\tchunks");
    println!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        report.job_run_id,
        status,
        report.records_read,
        report.accessioned,
        report.existing,
        report.clustered,
        report.clustering.created,
        report.clustering.merged,
        report.clustering.split,
        report.total_skipped(),
        report.chunks
    );
}
