use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::store::document::index_value;
use crate::store::{BulkInsertReport, Document, Filter, RecordStore, StoreError};

/// Snapshot format version for compatibility checking
pub const SNAPSHOT_VERSION: &str = "1.0.0";

/// A stored document together with the unique keys it currently holds
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    unique_keys: Vec<(String, String)>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    documents: BTreeMap<String, StoredDocument>,
    /// Index: unique index name -> value -> primary key
    unique: HashMap<String, HashMap<String, String>>,
    /// Index: field -> value -> primary keys (built on first use)
    #[serde(skip)]
    secondary: HashMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl Collection {
    fn holder(&self, index: &str, value: &str) -> Option<&String> {
        self.unique.get(index).and_then(|values| values.get(value))
    }

    fn ensure_index(&mut self, field: &str) {
        if self.secondary.contains_key(field) {
            return;
        }
        let mut index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (key, stored) in &self.documents {
            let value = stored.value.get(field).unwrap_or(&Value::Null);
            index
                .entry(index_value(value))
                .or_default()
                .insert(key.clone());
        }
        self.secondary.insert(field.to_string(), index);
    }

    fn index_document(&mut self, key: &str, value: &Value) {
        for (field, index) in &mut self.secondary {
            let field_value = value.get(field).unwrap_or(&Value::Null);
            index
                .entry(index_value(field_value))
                .or_default()
                .insert(key.to_string());
        }
    }

    fn unindex_document(&mut self, key: &str, value: &Value) {
        for (field, index) in &mut self.secondary {
            let field_value = index_value(value.get(field).unwrap_or(&Value::Null));
            if let Some(keys) = index.get_mut(&field_value) {
                keys.remove(key);
                if keys.is_empty() {
                    index.remove(&field_value);
                }
            }
        }
    }

    /// Check that `unique_keys` are free or already held by `key` itself
    fn check_unique(
        &self,
        collection: &'static str,
        key: &str,
        unique_keys: &[(&'static str, String)],
    ) -> Result<(), StoreError> {
        for (index, value) in unique_keys {
            if let Some(existing) = self.holder(index, value) {
                if existing != key {
                    return Err(StoreError::DuplicateKey {
                        collection,
                        index: *index,
                        value: value.clone(),
                        existing_key: existing.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn insert(
        &mut self,
        collection: &'static str,
        key: String,
        value: Value,
        unique_keys: Vec<(&'static str, String)>,
    ) -> Result<(), StoreError> {
        if self.documents.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                collection,
                index: "_id",
                value: key.clone(),
                existing_key: key,
            });
        }
        self.check_unique(collection, &key, &unique_keys)?;

        for (index, unique_value) in &unique_keys {
            self.unique
                .entry((*index).to_string())
                .or_default()
                .insert(unique_value.clone(), key.clone());
        }
        self.index_document(&key, &value);
        self.documents.insert(
            key,
            StoredDocument {
                value,
                unique_keys: unique_keys
                    .into_iter()
                    .map(|(index, v)| (index.to_string(), v))
                    .collect(),
            },
        );
        Ok(())
    }

    fn replace(
        &mut self,
        collection: &'static str,
        key: String,
        value: Value,
        unique_keys: Vec<(&'static str, String)>,
    ) -> Result<(), StoreError> {
        if !self.documents.contains_key(&key) {
            return Err(StoreError::NotFound { collection, key });
        }
        self.check_unique(collection, &key, &unique_keys)?;

        let Some(previous) = self.documents.remove(&key) else {
            return Err(StoreError::NotFound { collection, key });
        };
        for (index, old_value) in &previous.unique_keys {
            if let Some(values) = self.unique.get_mut(index) {
                values.remove(old_value);
            }
        }
        self.unindex_document(&key, &previous.value);
        self.insert(collection, key, value, unique_keys)
    }

    fn find(&mut self, filter: &Filter, indexed_fields: &[&str]) -> Vec<Value> {
        let indexed = filter
            .conditions()
            .iter()
            .find(|(field, _)| indexed_fields.contains(&field.as_str()));

        match indexed {
            Some((field, expected)) => {
                self.ensure_index(field);
                let Some(keys) = self
                    .secondary
                    .get(field)
                    .and_then(|index| index.get(&index_value(expected)))
                else {
                    return Vec::new();
                };
                keys.iter()
                    .filter_map(|key| self.documents.get(key))
                    .filter(|stored| filter.matches(&stored.value))
                    .map(|stored| stored.value.clone())
                    .collect()
            }
            None => self
                .documents
                .values()
                .filter(|stored| filter.matches(&stored.value))
                .map(|stored| stored.value.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    version: String,
    counters: BTreeMap<String, u64>,
    collections: BTreeMap<String, Collection>,
}

/// In-memory [`RecordStore`] with optional JSON snapshot persistence.
///
/// A single mutex serializes all operations, which makes every call atomic
/// with respect to every other, counters included.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    snapshot_path: Option<PathBuf>,
    /// Exclusive lock on the snapshot, released when the store is dropped
    _lock: Option<File>,
}

impl MemoryStore {
    /// Create an empty, non-persistent store
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                version: SNAPSHOT_VERSION.to_string(),
                ..StoreState::default()
            }),
            snapshot_path: None,
            _lock: None,
        }
    }

    /// Open a store backed by a snapshot file, loading it if it exists.
    ///
    /// The snapshot is locked exclusively through a sibling `.lock` file for
    /// as long as the store lives, so two processes never share a counter.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Locked` if another store holds the snapshot,
    /// `StoreError::Io` if the file cannot be read, or
    /// `StoreError::Serialization` if it is not a valid snapshot.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let lock = lock_snapshot(path)?;
        let state = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let state: StoreState = serde_json::from_str(&content)?;
            if state.version != SNAPSHOT_VERSION {
                warn!(
                    "Snapshot version mismatch (expected {}, found {})",
                    SNAPSHOT_VERSION, state.version
                );
            }
            debug!(
                "Loaded snapshot {} with {} collections",
                path.display(),
                state.collections.len()
            );
            state
        } else {
            StoreState {
                version: SNAPSHOT_VERSION.to_string(),
                ..StoreState::default()
            }
        };

        Ok(Self {
            state: Mutex::new(state),
            snapshot_path: Some(path.to_path_buf()),
            _lock: Some(lock),
        })
    }

    /// Current value of a counter, if it has been used
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the store lock is poisoned.
    pub fn counter_value(&self, name: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.lock()?.counters.get(name).copied())
    }

    /// Number of documents in a collection
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the store lock is poisoned.
    pub fn count<D: Document>(&self) -> Result<usize, StoreError> {
        Ok(self
            .lock()?
            .collections
            .get(D::COLLECTION)
            .map_or(0, |c| c.documents.len()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn increment_counter(&self, name: &str, initial: u64, by: u64) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let counter = state.counters.entry(name.to_string()).or_insert(initial);
        let previous = *counter;
        *counter = previous
            .checked_add(by)
            .ok_or_else(|| StoreError::Unavailable(format!("counter '{name}' overflow")))?;
        Ok(previous)
    }

    fn insert<D: Document>(&self, document: &D) -> Result<(), StoreError> {
        let value = serde_json::to_value(document)?;
        let mut state = self.lock()?;
        state
            .collections
            .entry(D::COLLECTION.to_string())
            .or_default()
            .insert(D::COLLECTION, document.key(), value, document.unique_keys())
    }

    fn bulk_insert<D: Document>(&self, documents: &[D]) -> Result<BulkInsertReport, StoreError> {
        let values = documents
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.lock()?;
        let collection = state
            .collections
            .entry(D::COLLECTION.to_string())
            .or_default();

        let mut report = BulkInsertReport::default();
        for (document, value) in documents.iter().zip(values) {
            let key = document.key();
            match collection.insert(D::COLLECTION, key.clone(), value, document.unique_keys()) {
                Ok(()) => report.inserted += 1,
                Err(e) if e.is_duplicate_key() => {
                    warn!("Skipping duplicate {} document {}: {}", D::COLLECTION, key, e);
                    report.duplicates.push(key);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    fn replace<D: Document>(&self, document: &D) -> Result<(), StoreError> {
        let value = serde_json::to_value(document)?;
        let mut state = self.lock()?;
        state
            .collections
            .entry(D::COLLECTION.to_string())
            .or_default()
            .replace(D::COLLECTION, document.key(), value, document.unique_keys())
    }

    fn get<D: Document>(&self, key: &str) -> Result<Option<D>, StoreError> {
        let state = self.lock()?;
        let Some(stored) = state
            .collections
            .get(D::COLLECTION)
            .and_then(|c| c.documents.get(key))
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(stored.value.clone())?))
    }

    fn find<D: Document>(&self, filter: &Filter) -> Result<Vec<D>, StoreError> {
        filter.check()?;
        let mut state = self.lock()?;
        let Some(collection) = state.collections.get_mut(D::COLLECTION) else {
            return Ok(Vec::new());
        };
        collection
            .find(filter, D::INDEXED_FIELDS)
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(StoreError::from))
            .collect()
    }

    fn find_one_by_unique<D: Document>(
        &self,
        index: &str,
        value: &str,
    ) -> Result<Option<D>, StoreError> {
        let state = self.lock()?;
        let Some(collection) = state.collections.get(D::COLLECTION) else {
            return Ok(None);
        };
        let Some(stored) = collection
            .holder(index, value)
            .and_then(|key| collection.documents.get(key))
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(stored.value.clone())?))
    }

    fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let state = self.lock()?;
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        // Write then rename so a crash never leaves a truncated snapshot
        let mut temp = tempfile::NamedTempFile::new_in(directory)?;
        serde_json::to_writer(&mut temp, &*state)?;
        temp.flush()?;
        temp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        debug!("Flushed snapshot to {}", path.display());
        Ok(())
    }
}

/// Lock file guarding `snapshot`
fn lock_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot.file_name().map(OsString::from).unwrap_or_default();
    name.push(".lock");
    snapshot.with_file_name(name)
}

fn lock_snapshot(snapshot: &Path) -> Result<File, StoreError> {
    let path = lock_path(snapshot);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)?;
    match file.try_lock_exclusive() {
        Ok(()) => {
            debug!("Locked {}", path.display());
            Ok(file)
        }
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
            Err(StoreError::Locked(snapshot.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}
