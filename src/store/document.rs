use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::store::StoreError;

/// A record that can be kept in a [`RecordStore`](crate::store::RecordStore) collection.
///
/// Documents are stored as JSON objects. The primary key and every unique key
/// are enforced by the store; secondary indexes only speed up [`Filter`] queries.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection name
    const COLLECTION: &'static str;

    /// Top-level fields the store keeps an equality index for
    const INDEXED_FIELDS: &'static [&'static str] = &[];

    /// Primary key
    fn key(&self) -> String;

    /// Unique constraints as `(index name, value)` pairs.
    ///
    /// A document may drop a unique key when its state changes (for example a
    /// cluster leaving the ACTIVE state releases its clustering key).
    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// Field-equality query over top-level document fields
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
    /// First condition whose value could not be serialized, with the cause
    invalid: Option<(String, String)>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`. Values are compared in their serialized JSON form.
    ///
    /// A value that cannot be serialized makes the filter invalid: it matches
    /// nothing and [`check`](Self::check) reports the failure.
    #[must_use]
    pub fn eq<V: Serialize>(mut self, field: &str, value: V) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => self.conditions.push((field.to_string(), value)),
            Err(e) => {
                self.invalid
                    .get_or_insert_with(|| (field.to_string(), e.to_string()));
            }
        }
        self
    }

    /// Fail if a condition value could not be serialized
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidFilter` naming the first such field.
    pub fn check(&self) -> Result<(), StoreError> {
        match &self.invalid {
            Some((field, message)) => Err(StoreError::InvalidFilter {
                field: field.clone(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Check a serialized document against every condition
    pub fn matches(&self, document: &Value) -> bool {
        self.invalid.is_none()
            && self
                .conditions
                .iter()
            .all(|(field, expected)| document.get(field).unwrap_or(&Value::Null) == expected)
    }
}

/// Render an indexed field value as an index key
pub(crate) fn index_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_all_conditions() {
        let doc = json!({"contig": "1", "start": 100, "status": "ACTIVE"});
        assert!(Filter::new().eq("contig", "1").eq("start", 100).matches(&doc));
        assert!(!Filter::new().eq("contig", "1").eq("start", 101).matches(&doc));
        assert!(Filter::new().matches(&doc));
    }

    #[test]
    fn test_filter_missing_field_matches_null() {
        let doc = json!({"contig": "1"});
        assert!(Filter::new().eq("merged_into", Option::<u64>::None).matches(&doc));
        assert!(!Filter::new().eq("merged_into", Some(5_u64)).matches(&doc));
    }

    #[test]
    fn test_unserializable_value_invalidates_filter() {
        let doc = json!({"contig": "1", "tags": null});
        // JSON object keys must be strings
        let tags: std::collections::BTreeMap<Vec<u8>, u8> = [(vec![1], 1)].into_iter().collect();
        let filter = Filter::new().eq("contig", "1").eq("tags", tags);

        assert!(!filter.matches(&doc));
        assert!(matches!(
            filter.check(),
            Err(StoreError::InvalidFilter { field, .. }) if field == "tags"
        ));
        assert!(Filter::new().eq("contig", "1").check().is_ok());
    }
}
