use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::types::Category;
use crate::core::variant::accession_key;
use crate::store::Document;

static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// What happened to an accession
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Created,
    /// A submitted variant's clustered-variant back-reference changed
    Updated {
        clustered_variant_accession: Option<u64>,
    },
    Merged {
        merged_into: u64,
    },
    Deprecated,
    /// Members of `accession` were moved to `split_into`
    Split {
        split_into: u64,
    },
    /// Active clusters found sharing one clustering key
    RsMergeCandidates {
        candidates: Vec<u64>,
    },
}

impl EventKind {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Updated { .. } => "UPDATED",
            Self::Merged { .. } => "MERGED",
            Self::Deprecated => "DEPRECATED",
            Self::Split { .. } => "SPLIT",
            Self::RsMergeCandidates { .. } => "RS_MERGE_CANDIDATES",
        }
    }
}

/// Append-only audit record of a mutating operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEvent {
    pub id: String,
    pub category: Category,
    pub accession: u64,
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(default)]
    pub reason: Option<String>,
    /// State of the record before the operation
    #[serde(default)]
    pub snapshot: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl OperationEvent {
    #[must_use]
    pub fn new(category: Category, accession: u64, kind: EventKind) -> Self {
        let created_at = Utc::now();
        let sequence = EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let id = format!(
            "{category}-{}-{}-{}-{sequence}",
            accession_key(accession),
            created_at.timestamp_nanos_opt().unwrap_or_default(),
            std::process::id(),
        );
        Self {
            id,
            category,
            accession,
            kind,
            reason: None,
            snapshot: None,
            created_at,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach the prior state of the record
    #[must_use]
    pub fn with_snapshot<T: Serialize>(mut self, record: &T) -> Self {
        self.snapshot = serde_json::to_value(record).ok();
        self
    }
}

impl Document for OperationEvent {
    const COLLECTION: &'static str = "operation_events";
    const INDEXED_FIELDS: &'static [&'static str] = &["accession", "event_type"];

    fn key(&self) -> String {
        self.id.clone()
    }
}
