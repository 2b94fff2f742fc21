use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::accession::retry::RetryPolicy;
use crate::core::types::{Archive, Category};
use crate::pipeline::PipelineError;

/// Default number of records per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default accessions per reserved block
pub const DEFAULT_BLOCK_SIZE: u64 = 1000;

/// One value per accession category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerCategory<T> {
    pub ss: T,
    pub rs: T,
}

impl<T: Copy> PerCategory<T> {
    pub fn get(&self, category: Category) -> T {
        match category {
            Category::Ss => self.ss,
            Category::Rs => self.rs,
        }
    }
}

impl<T: Default> Default for PerCategory<T> {
    fn default() -> Self {
        Self {
            ss: T::default(),
            rs: T::default(),
        }
    }
}

/// Settings of one accessioning job.
///
/// Loaded from a JSON file; every field is optional there and falls back to
/// its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub assembly_accession: String,
    /// Project used for rows that do not name one
    pub project_accession: String,
    /// Identifies this process as a block owner
    pub instance_id: String,
    pub job_run_id: String,
    pub chunk_size: usize,
    /// Blocks untouched for longer than this are recovered at start-up
    pub recovery_cutoff_days: u64,
    /// Skip invalid records instead of failing the job on the first one
    pub force_import: bool,
    /// Recover every unfinished block at start-up, whatever its age
    pub force_restart: bool,
    pub load_to: Archive,
    /// Parallel accession + clustering lanes
    pub workers: usize,
    /// Chunks buffered between two stages
    pub channel_capacity: usize,
    pub block_size: PerCategory<u64>,
    /// Starting point of a fresh counter (category default when unset)
    pub first_accession: PerCategory<Option<u64>>,
    pub retry: RetryPolicy,
    /// NCBI assembly report providing contig synonyms
    pub assembly_report: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            assembly_accession: String::new(),
            project_accession: String::new(),
            instance_id: format!("instance-{}", std::process::id()),
            job_run_id: format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f")),
            chunk_size: DEFAULT_CHUNK_SIZE,
            recovery_cutoff_days: 7,
            force_import: false,
            force_restart: false,
            load_to: Archive::Eva,
            workers: 4,
            channel_capacity: 4,
            block_size: PerCategory {
                ss: DEFAULT_BLOCK_SIZE,
                rs: DEFAULT_BLOCK_SIZE,
            },
            first_accession: PerCategory::default(),
            retry: RetryPolicy::default(),
            assembly_report: None,
        }
    }
}

impl JobConfig {
    /// Load a configuration file
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Io` if the file cannot be read or
    /// `PipelineError::ConfigFormat` if it is not valid JSON.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Check that the settings can drive a job
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidConfig` describing the first problem.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let problem = if self.assembly_accession.trim().is_empty() {
            Some("assembly_accession is required")
        } else if self.project_accession.trim().is_empty() {
            Some("project_accession is required")
        } else if self.instance_id.trim().is_empty() {
            Some("instance_id must not be empty")
        } else if self.job_run_id.trim().is_empty() {
            Some("job_run_id must not be empty")
        } else if self.chunk_size == 0 {
            Some("chunk_size must be greater than zero")
        } else if self.workers == 0 {
            Some("workers must be greater than zero")
        } else if self.channel_capacity == 0 {
            Some("channel_capacity must be greater than zero")
        } else if self.block_size.ss == 0 || self.block_size.rs == 0 {
            Some("block_size must be greater than zero")
        } else if self.retry.max_attempts == 0 {
            Some("retry.max_attempts must be greater than zero")
        } else {
            None
        };

        match problem {
            Some(message) => Err(PipelineError::InvalidConfig(message.to_string())),
            None => Ok(()),
        }
    }

    /// Instance id of worker lane `lane`
    #[must_use]
    pub fn lane_instance_id(&self, lane: usize) -> String {
        format!("{}-{lane}", self.instance_id)
    }
}
