use serde::Serialize;
use std::collections::BTreeMap;

use crate::clustering::ClusteringStats;
use crate::recovery::RecoveryReport;

/// Skipped records kept verbatim in the report; further skips are only counted
pub const MAX_REPORTED_SKIPS: usize = 1000;

/// A record left out of the job, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub line: usize,
    /// Short stable label (e.g. `invalid_allele`)
    pub reason: String,
    pub message: String,
}

/// Final state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Completed,
    CompletedWithSkips,
    Failed,
}

impl JobStatus {
    /// Process exit code of the status
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::CompletedWithSkips => 2,
            Self::Failed => 1,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "COMPLETED"),
            Self::CompletedWithSkips => write!(f, "COMPLETED_WITH_SKIPS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Counters and outcome of one accessioning job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job_run_id: String,
    /// Input rows seen, skipped ones included
    pub records_read: u64,
    /// Submitted variants created by this job
    pub accessioned: u64,
    /// Submissions that resolved to an existing submitted variant
    pub existing: u64,
    /// Submitted variants attached to a clustered variant
    pub clustered: u64,
    pub clustering: ClusteringStats,
    /// Chunks committed
    pub chunks: u64,
    /// Skip counts per reason label
    pub skipped: BTreeMap<String, u64>,
    pub skipped_records: Vec<SkippedRecord>,
    pub recovery: Vec<RecoveryReport>,
    /// The job was stopped before reaching the end of its input
    pub interrupted: bool,
    /// The error that failed the job
    pub error: Option<String>,
}

impl JobReport {
    #[must_use]
    pub fn new(job_run_id: impl Into<String>) -> Self {
        Self {
            job_run_id: job_run_id.into(),
            ..Self::default()
        }
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }

    pub fn record_skip(&mut self, skip: SkippedRecord) {
        *self.skipped.entry(skip.reason.clone()).or_insert(0) += 1;
        if self.skipped_records.len() < MAX_REPORTED_SKIPS {
            self.skipped_records.push(skip);
        }
    }

    #[must_use]
    pub fn status(&self) -> JobStatus {
        if self.error.is_some() || self.interrupted {
            JobStatus::Failed
        } else if self.total_skipped() > 0 {
            JobStatus::CompletedWithSkips
        } else {
            JobStatus::Completed
        }
    }
}
