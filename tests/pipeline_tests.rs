//! Pipeline Integration Tests
//!
//! Runs complete accessioning jobs through the staged pipeline with several
//! worker lanes and checks what ends up in the store.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use variant_accession::accession::retry::RetryPolicy;
use variant_accession::accession::BlockAllocator;
use variant_accession::clustering::KeyDeriver;
use variant_accession::core::block::{AccessionBlock, BlockState};
use variant_accession::core::types::Category;
use variant_accession::core::variant::{ClusteredVariant, SubmittedVariant};
use variant_accession::parsing::variants::parse_variants_text;
use variant_accession::pipeline::{run_job, JobConfig, JobReport, JobStatus};
use variant_accession::store::{Filter, MemoryStore, RecordStore};

fn config(run: &str) -> JobConfig {
    JobConfig {
        assembly_accession: "GCA_1".to_string(),
        project_accession: "PRJ_DEFAULT".to_string(),
        instance_id: "it".to_string(),
        job_run_id: run.to_string(),
        chunk_size: 1,
        workers: 3,
        ..JobConfig::default()
    }
}

async fn run(store: &Arc<MemoryStore>, config: JobConfig, text: &str) -> JobReport {
    run_job(
        Arc::clone(store),
        config,
        Arc::new(KeyDeriver::new()),
        parse_variants_text(text).into_iter(),
        Arc::new(AtomicBool::new(false)),
    )
    .await
    .unwrap()
}

fn cluster_of(store: &MemoryStore, start: u64, project: &str) -> u64 {
    let found: Vec<SubmittedVariant> = store
        .find(
            &Filter::new()
                .eq("start", start)
                .eq("project_accession", project),
        )
        .unwrap();
    assert_eq!(found.len(), 1);
    found[0].clustered_variant_accession.unwrap()
}

#[tokio::test]
async fn test_projects_cluster_to_one_variant_across_lanes() {
    let store = Arc::new(MemoryStore::new());
    let text = "contig\tstart\tref\talt\tproject
1\t100\tA\tT\tPRJ1
1\t100\tA\tT\tPRJ2
1\t100\tA\tT\tPRJ3
1\t101\tA\tT\tPRJ1
";
    let report = run(&store, config("run-1"), text).await;
    assert_eq!(report.status(), JobStatus::Completed);
    assert_eq!(report.accessioned, 4);
    assert_eq!(report.clustered, 4);

    let rs = cluster_of(&store, 100, "PRJ1");
    assert_eq!(cluster_of(&store, 100, "PRJ2"), rs);
    assert_eq!(cluster_of(&store, 100, "PRJ3"), rs);
    assert_ne!(cluster_of(&store, 101, "PRJ1"), rs);

    let active: Vec<ClusteredVariant> = store.find(&Filter::new()).unwrap();
    assert_eq!(active.len(), 2);
}

#[tokio::test]
async fn test_accessions_distinct_and_blocks_committed() {
    let store = Arc::new(MemoryStore::new());
    let text: String = (1..=40)
        .map(|start| format!("1\t{start}\tC\tG\n"))
        .collect();
    let report = run(
        &store,
        JobConfig {
            chunk_size: 5,
            block_size: variant_accession::pipeline::PerCategory { ss: 7, rs: 7 },
            ..config("run-1")
        },
        &text,
    )
    .await;
    assert_eq!(report.accessioned, 40);
    assert_eq!(report.chunks, 8);

    let submitted: Vec<SubmittedVariant> = store.find(&Filter::new()).unwrap();
    let accessions: HashSet<u64> = submitted.iter().map(|s| s.accession).collect();
    assert_eq!(accessions.len(), 40);

    // Every drawn number is durable once the job completes
    let blocks: Vec<AccessionBlock> = store.find(&Filter::new().eq("category", Category::Ss)).unwrap();
    for block in &blocks {
        assert_eq!(block.last_committed, block.next_free);
        if block.next_free == block.end {
            assert_eq!(block.state, BlockState::Committed);
        }
    }
}

#[tokio::test]
async fn test_force_restart_recovers_abandoned_blocks() {
    let store = Arc::new(MemoryStore::new());
    let first = run(&store, config("run-1"), "1\t100\tA\tT\n").await;
    assert_eq!(first.status(), JobStatus::Completed);

    // A crashed instance left a reserved block behind
    let allocator = BlockAllocator::new(Arc::clone(&store), RetryPolicy::default());
    let orphan = allocator
        .reserve_block(Category::Ss, "crashed", "run-crashed", 50)
        .unwrap();

    let second = run(
        &store,
        JobConfig {
            force_restart: true,
            ..config("run-2")
        },
        "1\t200\tA\tT\n1\t300\tA\tT\n",
    )
    .await;
    assert_eq!(second.status(), JobStatus::Completed);
    let ss_recovery = second
        .recovery
        .iter()
        .find(|r| r.category == Category::Ss)
        .unwrap();
    assert!(ss_recovery.blocks_recovered >= 1);
    assert!(ss_recovery.retired_numbers() >= 50);

    let submitted: Vec<SubmittedVariant> = store.find(&Filter::new()).unwrap();
    assert_eq!(submitted.len(), 3);
    for ss in &submitted {
        assert!(!orphan.contains(ss.accession));
    }
    let recovered: AccessionBlock = store.get(&orphan.id()).unwrap().unwrap();
    assert_eq!(recovered.state, BlockState::Recovered);
}

#[tokio::test]
async fn test_skipped_records_reported_with_force_import() {
    let store = Arc::new(MemoryStore::new());
    let text = "1\t100\tA\tT\n1\t0\tA\tT\n1\t300\tA\t<DEL>\n1\t400\n";
    let report = run(
        &store,
        JobConfig {
            force_import: true,
            ..config("run-1")
        },
        text,
    )
    .await;
    assert_eq!(report.status(), JobStatus::CompletedWithSkips);
    assert_eq!(report.records_read, 4);
    assert_eq!(report.accessioned, 1);
    assert_eq!(report.total_skipped(), 3);
    assert_eq!(report.skipped["invalid_start"], 1);
    assert_eq!(report.skipped["invalid_allele"], 1);
    assert_eq!(report.skipped["malformed_record"], 1);
}

#[tokio::test]
async fn test_joining_instance_spares_live_blocks_of_its_run() {
    let store = Arc::new(MemoryStore::new());
    let allocator = BlockAllocator::new(Arc::clone(&store), RetryPolicy::default());
    let peer = allocator
        .reserve_block(Category::Ss, "peer-0", "run-1", 50)
        .unwrap();

    // A second host joins the same run while the peer is still working
    let report = run(&store, config("run-1"), "1\t100\tA\tT\n").await;
    assert_eq!(report.status(), JobStatus::Completed);
    assert!(report.recovery.iter().all(|r| r.blocks_recovered == 0));
    let live: AccessionBlock = store.get(&peer.id()).unwrap().unwrap();
    assert_eq!(live.state, BlockState::Open);

    // The peer restarting under the same run reclaims its own block at once
    let restarted = run(
        &store,
        JobConfig {
            instance_id: "peer".to_string(),
            ..config("run-1")
        },
        "1\t200\tA\tT\n",
    )
    .await;
    let ss_recovery = restarted
        .recovery
        .iter()
        .find(|r| r.category == Category::Ss)
        .unwrap();
    assert_eq!(ss_recovery.blocks_recovered, 1);
    let reclaimed: AccessionBlock = store.get(&peer.id()).unwrap().unwrap();
    assert_eq!(reclaimed.state, BlockState::Recovered);
}
