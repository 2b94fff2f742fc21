//! Staged accessioning jobs.
//!
//! A job reads pre-parsed variant records, accessions them, clusters them and
//! commits its progress chunk by chunk:
//!
//! ```text
//! reader ──┬─> lane 0: accession ─> cluster ──┬─> persist
//!          └─> lane N: accession ─> cluster ──┘
//! ```
//!
//! Stages are tokio tasks joined by bounded channels; store work runs on the
//! blocking pool. Each lane owns its generators, so blocks are never shared.
//!
//! - [`config`]: [`JobConfig`] settings, loadable from JSON
//! - [`job`]: [`run_job`]
//! - [`report`]: [`JobReport`] and the final [`JobStatus`]

pub mod config;
pub mod job;
pub mod report;

use thiserror::Error;

use crate::accession::AccessionError;
use crate::clustering::ClusteringError;
use crate::parsing::ParseError;
use crate::recovery::RecoveryError;
use crate::store::StoreError;

pub use config::{JobConfig, PerCategory};
pub use job::run_job;
pub use report::{JobReport, JobStatus, SkippedRecord};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid job configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    #[error(transparent)]
    Accession(#[from] AccessionError),

    #[error(transparent)]
    Clustering(#[from] ClusteringError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Pipeline task failed: {0}")]
    Task(String),
}
