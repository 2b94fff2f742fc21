//! Fingerprinting, block allocation and accession generation.
//!
//! - [`hasher`]: deterministic content fingerprints
//! - [`retry`]: the backoff policy applied to contended counter updates
//! - [`allocator`]: reserves disjoint accession blocks from the shared counter
//! - [`generator`]: resolves a fingerprint to an existing accession or draws a new one
//!
//! ## Guarantees
//!
//! 1. The same fingerprint always resolves to the same accession, whichever
//!    instance submits it and however often
//! 2. Accessions increase strictly within a block and are never reused;
//!    numbers lost to racing inserts are skipped for good
//! 3. No two fingerprints share an accession

pub mod allocator;
pub mod generator;
pub mod hasher;
pub mod retry;

use thiserror::Error;

use crate::core::types::Category;
use crate::store::StoreError;
use crate::utils::validation::ValidationError;

pub use allocator::{BlockAllocator, BlockCheckpoint};
pub use generator::{AccessionGenerator, AccessionOutcome, GeneratorSettings};

#[derive(Error, Debug)]
pub enum AccessionError {
    #[error("Could not reserve a {category} block after {attempts} attempts")]
    AllocationExhausted { category: Category, attempts: u32 },

    #[error("Block {0} was reclaimed by recovery while still in use")]
    BlockReclaimed(String),

    #[error("Block size must be greater than zero")]
    InvalidBlockSize,

    #[error("{category} accession {accession} is already issued to another record")]
    AccessionCollision { category: Category, accession: u64 },

    #[error("{collection} reported a duplicate of {key} but the record cannot be read")]
    MissingExisting {
        collection: &'static str,
        key: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccessionError {
    /// Errors that only affect the record being processed
    #[must_use]
    pub fn is_record_scoped(&self) -> bool {
        matches!(self, Self::AllocationExhausted { .. } | Self::Validation(_))
    }

    /// Short label used to count skipped records by reason
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::AllocationExhausted { .. } => "allocation_exhausted",
            Self::Validation(e) => e.label(),
            _ => "accession_error",
        }
    }
}
