use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{spawn_blocking, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::accession::{
    AccessionGenerator, AccessionOutcome, BlockAllocator, BlockCheckpoint, GeneratorSettings,
};
use crate::clustering::{ClusteringEngine, ClusteringStats, KeyDeriver};
use crate::core::event::{EventKind, OperationEvent};
use crate::core::types::{Archive, Category};
use crate::core::variant::{SubmittedVariant, VariantSubmission};
use crate::parsing::variants::VariantRecord;
use crate::parsing::ParseError;
use crate::pipeline::config::JobConfig;
use crate::pipeline::report::{JobReport, SkippedRecord};
use crate::pipeline::PipelineError;
use crate::recovery::{cutoff_from_days, RecoveryAgent, RecoveryReport};
use crate::store::RecordStore;
use crate::utils::validation::{validate_submission, ValidationError};

/// A slice of the input moving through the stages
#[derive(Debug, Default)]
struct Chunk {
    index: u64,
    records_read: u64,
    /// Validated submissions with their input line
    submissions: Vec<(usize, VariantSubmission)>,
    accessioned: Vec<(usize, SubmittedVariant)>,
    created: u64,
    existing: u64,
    clustered: u64,
    stats: ClusteringStats,
    checkpoints: Vec<BlockCheckpoint>,
    skipped: Vec<SkippedRecord>,
}

impl Chunk {
    fn skip(&mut self, line: usize, reason: &str, message: String) {
        self.skipped.push(SkippedRecord {
            line,
            reason: reason.to_string(),
            message,
        });
    }
}

type StageResult = Result<Chunk, PipelineError>;

/// Blocking work applied to every chunk of a worker lane
trait Stage: Send + 'static {
    fn process(&mut self, chunk: Chunk) -> StageResult;
}

/// Resolves submissions to submitted variants
struct AccessionStage<S> {
    store: S,
    generator: AccessionGenerator<S>,
    archive: Archive,
}

impl<S: RecordStore + Clone + 'static> Stage for AccessionStage<S> {
    fn process(&mut self, mut chunk: Chunk) -> StageResult {
        for (line, submission) in std::mem::take(&mut chunk.submissions) {
            match self.generator.get_or_create(&submission, self.archive) {
                Ok((submitted, AccessionOutcome::New)) => {
                    self.store.insert(&OperationEvent::new(
                        Category::Ss,
                        submitted.accession,
                        EventKind::Created,
                    ))?;
                    chunk.created += 1;
                    chunk.accessioned.push((line, submitted));
                }
                Ok((submitted, AccessionOutcome::Existing)) => {
                    chunk.existing += 1;
                    chunk.accessioned.push((line, submitted));
                }
                Err(e) if e.is_record_scoped() => chunk.skip(line, e.label(), e.to_string()),
                Err(e) => return Err(e.into()),
            }
        }
        chunk.checkpoints.extend(self.generator.take_checkpoints());
        Ok(chunk)
    }
}

/// Attaches accessioned variants to clusters
struct ClusterStage<S> {
    engine: ClusteringEngine<S>,
}

impl<S: RecordStore + Clone + 'static> Stage for ClusterStage<S> {
    fn process(&mut self, mut chunk: Chunk) -> StageResult {
        for (line, submitted) in &chunk.accessioned {
            match self.engine.cluster(submitted) {
                Ok(_) => chunk.clustered += 1,
                Err(e) if e.is_record_scoped() => {
                    chunk.skipped.push(SkippedRecord {
                        line: *line,
                        reason: e.label().to_string(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        chunk.stats = self.engine.take_stats();
        chunk.checkpoints.extend(self.engine.take_checkpoints());
        Ok(chunk)
    }
}

/// Run one accessioning job over `input`.
///
/// Recovery of abandoned blocks runs first. The input is then read in chunks
/// of `chunk_size` records and fanned out to `workers` lanes; each lane
/// accessions and clusters its chunks with its own generators, and a single
/// persist stage commits block checkpoints and flushes the store after every
/// chunk.
///
/// Setting `stop` lets in-flight chunks finish and stops reading; the job is
/// then reported as interrupted. Failures while processing are recorded in
/// the returned report rather than returned, so that the counts of committed
/// chunks survive.
///
/// # Errors
///
/// Returns `PipelineError::InvalidConfig` for unusable settings, recovery
/// failures, or `PipelineError::Task` if a stage panicked.
pub async fn run_job<S, I>(
    store: S,
    config: JobConfig,
    keys: Arc<KeyDeriver>,
    input: I,
    stop: Arc<AtomicBool>,
) -> Result<JobReport, PipelineError>
where
    S: RecordStore + Clone + 'static,
    I: Iterator<Item = Result<VariantRecord, ParseError>> + Send + 'static,
{
    config.validate()?;
    let config = Arc::new(config);
    let mut report = JobReport::new(config.job_run_id.clone());
    info!(
        "Starting job {} for {} ({} worker(s), chunks of {})",
        config.job_run_id, config.assembly_accession, config.workers, config.chunk_size
    );

    report.recovery = recover(store.clone(), Arc::clone(&config), Arc::clone(&keys)).await?;

    let halt = Arc::new(AtomicBool::new(false));
    let (persist_tx, mut persist_rx) = mpsc::channel::<StageResult>(config.channel_capacity);
    let mut lane_inputs = Vec::with_capacity(config.workers);
    let mut lanes = Vec::with_capacity(config.workers * 2);
    for lane in 0..config.workers {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        lane_inputs.push(tx);
        lanes.extend(spawn_lane(
            lane,
            store.clone(),
            &config,
            Arc::clone(&keys),
            rx,
            persist_tx.clone(),
        ));
    }
    drop(persist_tx);

    let reader = {
        let config = Arc::clone(&config);
        let keys = Arc::clone(&keys);
        let halt = Arc::clone(&halt);
        spawn_blocking(move || read_chunks(input, &config, &keys, &lane_inputs, &stop, &halt))
    };

    let allocator = BlockAllocator::new(store.clone(), config.retry.clone());
    while let Some(received) = persist_rx.recv().await {
        let persisted = match received {
            Ok(chunk) => persist_chunk(store.clone(), allocator.clone(), chunk).await,
            Err(e) => Err(e),
        };
        match persisted {
            Ok(chunk) => {
                let first_skip = chunk
                    .skipped
                    .first()
                    .map(|s| format!("line {}: {} ({})", s.line, s.message, s.reason));
                debug!("Committed chunk {}", chunk.index);
                absorb(&mut report, chunk);
                if let (Some(first_skip), false) = (first_skip, config.force_import) {
                    error!("Invalid record without force_import, halting: {}", first_skip);
                    report.error = Some(format!(
                        "invalid record at {first_skip}; enable force_import to skip invalid records"
                    ));
                    halt.store(true, Ordering::SeqCst);
                    break;
                }
            }
            Err(e) => {
                error!("Job {} failed: {}", config.job_run_id, e);
                report.error = Some(e.to_string());
                halt.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
    drop(persist_rx);

    match reader.await {
        Ok(Ok(interrupted)) => report.interrupted = interrupted,
        Ok(Err(e)) => {
            error!("Reading input failed: {}", e);
            report.error.get_or_insert(e.to_string());
        }
        Err(e) => return Err(PipelineError::Task(e.to_string())),
    }
    for lane in lanes {
        lane.await.map_err(|e| PipelineError::Task(e.to_string()))?;
    }

    let flushing = store.clone();
    if let Err(e) = spawn_blocking(move || flushing.flush())
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
    {
        report.error.get_or_insert(e.to_string());
    }

    if report.interrupted {
        warn!(
            "Job {} interrupted after {} chunk(s); unfinished blocks are left for recovery",
            config.job_run_id, report.chunks
        );
    }
    info!(
        "Job {} {}: {} read, {} accessioned, {} existing, {} clustered ({} new clusters, {} merged), {} skipped",
        config.job_run_id,
        report.status(),
        report.records_read,
        report.accessioned,
        report.existing,
        report.clustered,
        report.clustering.created,
        report.clustering.merged,
        report.total_skipped()
    );
    Ok(report)
}

/// Settings of the `category` generator used under `instance_id`
fn generator_settings(config: &JobConfig, category: Category, instance_id: &str) -> GeneratorSettings {
    let mut settings = GeneratorSettings::new(instance_id, config.job_run_id.as_str())
        .with_block_size(config.block_size.get(category))
        .with_retry(config.retry.clone());
    if let Some(first) = config.first_accession.get(category) {
        settings = settings.with_first_accession(first);
    }
    settings
}

async fn recover<S>(
    store: S,
    config: Arc<JobConfig>,
    keys: Arc<KeyDeriver>,
) -> Result<Vec<RecoveryReport>, PipelineError>
where
    S: RecordStore + Clone + 'static,
{
    spawn_blocking(move || -> Result<Vec<RecoveryReport>, PipelineError> {
        let cutoff = if config.force_restart {
            Utc::now()
        } else {
            cutoff_from_days(config.recovery_cutoff_days)
        };
        let instance = format!("{}-recovery", config.instance_id);
        let clustering = ClusteringEngine::new(
            store.clone(),
            generator_settings(&config, Category::Rs, &instance),
            keys,
        );
        let restarting = (0..config.workers)
            .map(|lane| config.lane_instance_id(lane))
            .chain(std::iter::once(instance));
        let mut agent = RecoveryAgent::new(store.clone(), clustering).restarting(restarting);

        let mut reports = Vec::with_capacity(2);
        for category in [Category::Ss, Category::Rs] {
            reports.push(agent.run_recovery(category, &config.job_run_id, cutoff)?);
        }
        store.flush()?;
        Ok(reports)
    })
    .await
    .map_err(|e| PipelineError::Task(e.to_string()))?
}

/// Split the input into chunks and deal them to the lanes round-robin.
///
/// Returns whether reading stopped on request before the end of the input.
fn read_chunks<I>(
    input: I,
    config: &JobConfig,
    keys: &KeyDeriver,
    lanes: &[mpsc::Sender<StageResult>],
    stop: &AtomicBool,
    halt: &AtomicBool,
) -> Result<bool, PipelineError>
where
    I: Iterator<Item = Result<VariantRecord, ParseError>>,
{
    let mut input = input.peekable();
    let mut index: u64 = 0;

    while input.peek().is_some() {
        if halt.load(Ordering::SeqCst) {
            return Ok(false);
        }
        if stop.load(Ordering::SeqCst) {
            warn!("Stop requested, no further chunks will be read");
            return Ok(true);
        }

        let mut chunk = Chunk {
            index,
            ..Chunk::default()
        };
        for item in input.by_ref().take(config.chunk_size) {
            chunk.records_read += 1;
            match item {
                Ok(record) => {
                    let line = record.line;
                    let submission = record
                        .into_submission(&config.assembly_accession, &config.project_accession);
                    match check_submission(&submission, keys) {
                        Ok(()) => chunk.submissions.push((line, submission)),
                        Err(e) => chunk.skip(line, e.label(), e.to_string()),
                    }
                }
                Err(ParseError::InvalidRecord { line, message }) => {
                    let e = ValidationError::MalformedRecord(message);
                    chunk.skip(line, e.label(), e.to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }

        let lane = (index % lanes.len() as u64) as usize;
        if lanes[lane].blocking_send(Ok(chunk)).is_err() {
            // The lane is gone: the job is halting
            return Ok(false);
        }
        index += 1;
    }
    Ok(false)
}

fn check_submission(
    submission: &VariantSubmission,
    keys: &KeyDeriver,
) -> Result<(), ValidationError> {
    validate_submission(submission)?;
    keys.canonical_contig(&submission.reference_sequence_accession, &submission.contig)?;
    Ok(())
}

fn spawn_lane<S>(
    lane: usize,
    store: S,
    config: &JobConfig,
    keys: Arc<KeyDeriver>,
    input: mpsc::Receiver<StageResult>,
    output: mpsc::Sender<StageResult>,
) -> [JoinHandle<()>; 2]
where
    S: RecordStore + Clone + 'static,
{
    let instance = config.lane_instance_id(lane);
    let accession = AccessionStage {
        store: store.clone(),
        generator: AccessionGenerator::new(
            store.clone(),
            Category::Ss,
            generator_settings(config, Category::Ss, &instance),
        ),
        archive: config.load_to,
    };
    let cluster = ClusterStage {
        engine: ClusteringEngine::new(
            store,
            generator_settings(config, Category::Rs, &instance),
            keys,
        ),
    };
    debug!("Starting lane {}", instance);

    let (tx, rx) = mpsc::channel(config.channel_capacity);
    [
        tokio::spawn(run_stage(accession, input, tx)),
        tokio::spawn(run_stage(cluster, rx, output)),
    ]
}

/// Drive `stage` over every chunk until the input ends, an error passes
/// through, or the downstream stage goes away.
async fn run_stage<W: Stage>(
    mut stage: W,
    mut input: mpsc::Receiver<StageResult>,
    output: mpsc::Sender<StageResult>,
) {
    while let Some(received) = input.recv().await {
        let result = match received {
            Ok(chunk) => match spawn_blocking(move || {
                let result = stage.process(chunk);
                (stage, result)
            })
            .await
            {
                Ok((returned, result)) => {
                    stage = returned;
                    result
                }
                Err(e) => {
                    let _ = output.send(Err(PipelineError::Task(e.to_string()))).await;
                    return;
                }
            },
            Err(e) => Err(e),
        };

        let failed = result.is_err();
        if output.send(result).await.is_err() || failed {
            return;
        }
    }
}

async fn persist_chunk<S>(store: S, allocator: BlockAllocator<S>, chunk: Chunk) -> StageResult
where
    S: RecordStore + Clone + 'static,
{
    spawn_blocking(move || -> StageResult {
        for checkpoint in &chunk.checkpoints {
            allocator.commit(checkpoint)?;
        }
        store.flush()?;
        Ok(chunk)
    })
    .await
    .map_err(|e| PipelineError::Task(e.to_string()))?
}

fn absorb(report: &mut JobReport, chunk: Chunk) {
    report.chunks += 1;
    report.records_read += chunk.records_read;
    report.accessioned += chunk.created;
    report.existing += chunk.existing;
    report.clustered += chunk.clustered;
    report.clustering.absorb(chunk.stats);
    for skip in chunk.skipped {
        warn!("Skipped line {}: {} ({})", skip.line, skip.message, skip.reason);
        report.record_skip(skip);
    }
}
