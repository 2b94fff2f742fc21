//! Clustering of submitted variants into clustered variants.
//!
//! - [`key`]: clustering key derivation (allele normalization, contig synonyms)
//! - [`engine`]: the [`ClusteringEngine`] that attaches, creates, merges and
//!   splits clusters
//!
//! ## Clustering key
//!
//! Two submitted variants belong to the same cluster when they share
//! (assembly, canonical contig, normalized start, variant type). Among ACTIVE
//! clusters the key is unique; MERGED and DEPRECATED clusters keep their key
//! for history but no longer claim it.
//!
//! Every mutation appends an [`OperationEvent`](crate::core::event::OperationEvent).

pub mod engine;
pub mod key;

use thiserror::Error;

use crate::accession::AccessionError;
use crate::core::types::{Category, ClusterStatus};
use crate::store::StoreError;
use crate::utils::validation::ValidationError;

pub use engine::{ClusteringEngine, ClusteringStats, RekeyReport};
pub use key::{ClusteringKey, KeyDeriver};

#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error("{category}{accession} not found")]
    NotFound { category: Category, accession: u64 },

    #[error("ss{0} is deprecated and cannot be clustered")]
    InactiveSubmission(u64),

    #[error("rs{accession} is {status}; {operation} requires an ACTIVE cluster")]
    InvalidTransition {
        accession: u64,
        status: ClusterStatus,
        operation: &'static str,
    },

    #[error("ss{ss} is not a member of rs{rs}")]
    NotAMember { ss: u64, rs: u64 },

    #[error("ss{ss} still shares the clustering key of rs{rs}")]
    NoDivergence { ss: u64, rs: u64 },

    #[error("Merge chain starting at rs{0} does not terminate")]
    MergeCycle(u64),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Accession(#[from] AccessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClusteringError {
    /// Errors that only affect the record being processed
    #[must_use]
    pub fn is_record_scoped(&self) -> bool {
        match self {
            Self::Validation(_) | Self::InactiveSubmission(_) => true,
            Self::Accession(e) => e.is_record_scoped(),
            _ => false,
        }
    }

    /// Short label used to count skipped records by reason
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.label(),
            Self::InactiveSubmission(_) => "deprecated_submission",
            Self::Accession(e) => e.label(),
            _ => "clustering_error",
        }
    }
}
