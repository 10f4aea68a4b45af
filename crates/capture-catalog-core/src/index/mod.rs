//! Search index abstraction.
//!
//! The [`SearchIndex`] trait models the consumed search-index service:
//! index existence, creation with a mapping, mapping reads and updates,
//! document upsert by id, and index deletion. One index exists per capture
//! type (`captures-<type>`); it is a rebuildable projection of the
//! relational store and never authoritative.
//!
//! Implementations perform exactly one attempt per call. Retrying is the
//! caller's decision.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::schema::FieldType;

/// Field name to mapping type.
pub type IndexMapping = BTreeMap<String, FieldType>;

/// Index creation settings. Not semantically load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub shards: u32,
    pub replicas: u32,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            shards: 1,
            replicas: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    /// The service refused a mapping change to an existing field.
    #[error("incompatible mapping change for field '{field}' on index '{index}': {reason}")]
    IncompatibleMapping {
        index: String,
        field: String,
        reason: String,
    },

    #[error("index '{index}' already exists")]
    AlreadyExists { index: String },

    #[error("index '{index}' not found")]
    NotFound { index: String },

    #[error("search index request timed out ({index})")]
    Timeout { index: String },

    #[error("search index error on '{index}': {message}")]
    Service { index: String, message: String },
}

impl IndexError {
    pub fn service(index: &str, message: impl Into<String>) -> Self {
        IndexError::Service {
            index: index.to_string(),
            message: message.into(),
        }
    }
}

/// Difference between a current and a target mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingDiff {
    /// Target fields absent from the current mapping.
    pub added: IndexMapping,
    /// Fields present in both with different types: `(current, target)`.
    pub changed: BTreeMap<String, (FieldType, FieldType)>,
}

impl MappingDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty()
    }
}

/// Compare mappings. Fields only present in `current` are ignored: the
/// service cannot remove them and they do not block the target.
pub fn diff_mapping(current: &IndexMapping, target: &IndexMapping) -> MappingDiff {
    let mut diff = MappingDiff::default();
    for (field, target_ty) in target {
        match current.get(field) {
            None => {
                diff.added.insert(field.clone(), *target_ty);
            }
            Some(current_ty) if current_ty != target_ty => {
                diff.changed.insert(field.clone(), (*current_ty, *target_ty));
            }
            Some(_) => {}
        }
    }
    diff
}

/// Consumed search-index service.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn exists(&self, index: &str) -> Result<bool, IndexError>;

    async fn create(
        &self,
        index: &str,
        mapping: &IndexMapping,
        settings: &IndexSettings,
    ) -> Result<(), IndexError>;

    async fn get_mapping(&self, index: &str) -> Result<IndexMapping, IndexError>;

    /// Merge `mapping` into the index mapping. Fails with
    /// [`IndexError::IncompatibleMapping`] when a field's type would change.
    async fn put_mapping(&self, index: &str, mapping: &IndexMapping) -> Result<(), IndexError>;

    /// Insert or overwrite the document stored under `doc_id`.
    async fn upsert(&self, index: &str, doc_id: &str, document: &Value) -> Result<(), IndexError>;

    async fn delete_index(&self, index: &str) -> Result<(), IndexError>;

    async fn get_document(&self, index: &str, doc_id: &str) -> Result<Option<Value>, IndexError>;

    async fn count(&self, index: &str) -> Result<u64, IndexError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_reports_added_and_changed() {
        let current: IndexMapping = [
            ("gain".to_string(), FieldType::Keyword),
            ("channel".to_string(), FieldType::Keyword),
            ("legacy".to_string(), FieldType::Text),
        ]
        .into_iter()
        .collect();
        let target: IndexMapping = [
            ("gain".to_string(), FieldType::Float),
            ("channel".to_string(), FieldType::Keyword),
            ("span".to_string(), FieldType::Double),
        ]
        .into_iter()
        .collect();

        let diff = diff_mapping(&current, &target);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added["span"], FieldType::Double);
        assert_eq!(diff.changed["gain"], (FieldType::Keyword, FieldType::Float));
        assert!(diff_mapping(&target, &target).is_empty());
    }
}
