//! Recovery of accession blocks left behind by crashed or interrupted runs.
//!
//! A block is complete when every number in it is either backed by a row or
//! recorded as a [`RetiredRange`](crate::core::block::RetiredRange). The
//! [`RecoveryAgent`] brings abandoned blocks to that state so that their
//! unused numbers are skipped for good and never reissued.

pub mod agent;

use thiserror::Error;

use crate::accession::AccessionError;
use crate::clustering::ClusteringError;
use crate::store::StoreError;

pub use agent::{cutoff_from_days, RecoveryAgent, RecoveryReport};

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Recovery could not re-cluster: {0}")]
    Clustering(#[from] ClusteringError),

    #[error(transparent)]
    Accession(#[from] AccessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
