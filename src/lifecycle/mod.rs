//! Deprecation and remapping of accessioned variants.
//!
//! - [`DeprecationEngine`]: retires submitted variants (individually, by
//!   project, or for invalid alleles) and the clusters they leave empty
//! - [`RemappingEngine`]: carries submitted variants into a new assembly with
//!   a provenance link to their source
//!
//! Deprecated records are never deleted and keep resolving by accession.

pub mod deprecation;
pub mod remapping;

use thiserror::Error;

use crate::accession::AccessionError;
use crate::clustering::ClusteringError;
use crate::core::types::Category;
use crate::store::StoreError;

pub use deprecation::{DeprecationEngine, DeprecationReport};
pub use remapping::{RemapEntry, RemapReport, RemappingEngine};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("{category}{accession} not found")]
    NotFound { category: Category, accession: u64 },

    #[error(transparent)]
    Clustering(#[from] ClusteringError),

    #[error(transparent)]
    Accession(#[from] AccessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
