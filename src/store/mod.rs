//! Record store contract and the in-memory implementation.
//!
//! The accessioning engine only talks to its bulk storage through
//! [`RecordStore`]:
//!
//! - **Atomic counters**: `increment_counter` is a single read-modify-write
//! - **Unique inserts**: `insert` reports [`StoreError::DuplicateKey`] distinctly
//!   from every other failure so callers can fall back to the existing record
//! - **Bulk inserts**: unordered, individual duplicates are reported, not fatal
//! - **Equality queries**: [`Filter`] over top-level document fields
//!
//! [`MemoryStore`] keeps collections in memory and can persist a JSON snapshot
//! to disk so that consecutive CLI runs share state.

pub mod document;
pub mod memory;

use thiserror::Error;

pub use document::{Document, Filter};
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate key in {collection}.{index}: {value}")]
    DuplicateKey {
        collection: &'static str,
        index: &'static str,
        value: String,
        /// Primary key of the document already holding the value
        existing_key: String,
    },

    #[error("Concurrent update conflict on counter '{0}'")]
    Contention(String),

    #[error("Document {key} not found in {collection}")]
    NotFound {
        collection: &'static str,
        key: String,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store {} is in use by another process", .0.display())]
    Locked(std::path::PathBuf),

    #[error("Invalid filter on '{field}': {message}")]
    InvalidFilter { field: String, message: String },

    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

/// Outcome of an unordered bulk insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkInsertReport {
    pub inserted: usize,
    /// Primary keys of documents rejected by a uniqueness constraint
    pub duplicates: Vec<String>,
}

/// Minimal document-store contract used by the engine
pub trait RecordStore: Send + Sync {
    /// Atomically add `by` to the named counter and return its previous value.
    ///
    /// A counter that does not exist yet starts at `initial`.
    fn increment_counter(&self, name: &str, initial: u64, by: u64) -> Result<u64, StoreError>;

    /// Insert a new document, enforcing its primary and unique keys
    fn insert<D: Document>(&self, document: &D) -> Result<(), StoreError>;

    /// Insert many documents; duplicates are skipped and reported
    fn bulk_insert<D: Document>(&self, documents: &[D]) -> Result<BulkInsertReport, StoreError>;

    /// Replace an existing document with the same primary key
    fn replace<D: Document>(&self, document: &D) -> Result<(), StoreError>;

    /// Fetch a document by primary key
    fn get<D: Document>(&self, key: &str) -> Result<Option<D>, StoreError>;

    /// All documents matching the filter, ordered by primary key
    fn find<D: Document>(&self, filter: &Filter) -> Result<Vec<D>, StoreError>;

    /// Fetch the document currently holding a unique key value
    fn find_one_by_unique<D: Document>(
        &self,
        index: &str,
        value: &str,
    ) -> Result<Option<D>, StoreError>;

    /// Make previously acknowledged writes durable
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl<S: RecordStore> RecordStore for std::sync::Arc<S> {
    fn increment_counter(&self, name: &str, initial: u64, by: u64) -> Result<u64, StoreError> {
        (**self).increment_counter(name, initial, by)
    }

    fn insert<D: Document>(&self, document: &D) -> Result<(), StoreError> {
        (**self).insert(document)
    }

    fn bulk_insert<D: Document>(&self, documents: &[D]) -> Result<BulkInsertReport, StoreError> {
        (**self).bulk_insert(documents)
    }

    fn replace<D: Document>(&self, document: &D) -> Result<(), StoreError> {
        (**self).replace(document)
    }

    fn get<D: Document>(&self, key: &str) -> Result<Option<D>, StoreError> {
        (**self).get(key)
    }

    fn find<D: Document>(&self, filter: &Filter) -> Result<Vec<D>, StoreError> {
        (**self).find(filter)
    }

    fn find_one_by_unique<D: Document>(
        &self,
        index: &str,
        value: &str,
    ) -> Result<Option<D>, StoreError> {
        (**self).find_one_by_unique(index, value)
    }

    fn flush(&self) -> Result<(), StoreError> {
        (**self).flush()
    }
}
