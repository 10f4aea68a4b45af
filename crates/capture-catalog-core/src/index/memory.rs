//! In-memory [`SearchIndex`] for testing.
//!
//! Behaves like the real service where it matters to the catalog: a
//! mapping update that changes an existing field's type is rejected, and
//! upserts overwrite by id. Call counters and injected upsert failures let
//! tests observe idempotence and batch isolation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use super::{IndexError, IndexMapping, IndexSettings, SearchIndex};

struct StoredIndex {
    mapping: IndexMapping,
    settings: IndexSettings,
    docs: BTreeMap<String, Value>,
}

/// In-memory search index.
#[derive(Default)]
pub struct InMemoryIndex {
    indices: RwLock<HashMap<String, StoredIndex>>,
    failing_docs: RwLock<HashSet<String>>,
    create_calls: AtomicUsize,
    put_mapping_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
}

fn poisoned(index: &str) -> IndexError {
    IndexError::service(index, "in-memory index lock poisoned")
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert of `doc_id` fail with a service error.
    pub fn fail_upserts_for(&self, doc_id: impl Into<String>) {
        if let Ok(mut failing) = self.failing_docs.write() {
            failing.insert(doc_id.into());
        }
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn put_mapping_calls(&self) -> usize {
        self.put_mapping_calls.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn settings(&self, index: &str) -> Option<IndexSettings> {
        self.indices.read().ok()?.get(index).map(|i| i.settings)
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn exists(&self, index: &str) -> Result<bool, IndexError> {
        let indices = self.indices.read().map_err(|_| poisoned(index))?;
        Ok(indices.contains_key(index))
    }

    async fn create(
        &self,
        index: &str,
        mapping: &IndexMapping,
        settings: &IndexSettings,
    ) -> Result<(), IndexError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut indices = self.indices.write().map_err(|_| poisoned(index))?;
        if indices.contains_key(index) {
            return Err(IndexError::AlreadyExists {
                index: index.to_string(),
            });
        }
        indices.insert(
            index.to_string(),
            StoredIndex {
                mapping: mapping.clone(),
                settings: *settings,
                docs: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> Result<IndexMapping, IndexError> {
        let indices = self.indices.read().map_err(|_| poisoned(index))?;
        indices
            .get(index)
            .map(|i| i.mapping.clone())
            .ok_or_else(|| IndexError::NotFound {
                index: index.to_string(),
            })
    }

    async fn put_mapping(&self, index: &str, mapping: &IndexMapping) -> Result<(), IndexError> {
        self.put_mapping_calls.fetch_add(1, Ordering::SeqCst);
        let mut indices = self.indices.write().map_err(|_| poisoned(index))?;
        let stored = indices.get_mut(index).ok_or_else(|| IndexError::NotFound {
            index: index.to_string(),
        })?;

        // All-or-nothing, like the real service.
        for (field, ty) in mapping {
            if let Some(current) = stored.mapping.get(field) {
                if current != ty {
                    return Err(IndexError::IncompatibleMapping {
                        index: index.to_string(),
                        field: field.clone(),
                        reason: format!("mapper [{}] cannot be changed from type [{}] to [{}]", field, current, ty),
                    });
                }
            }
        }
        for (field, ty) in mapping {
            stored.mapping.insert(field.clone(), *ty);
        }
        Ok(())
    }

    async fn upsert(&self, index: &str, doc_id: &str, document: &Value) -> Result<(), IndexError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let fails = self
            .failing_docs
            .read()
            .map_err(|_| poisoned(index))?
            .contains(doc_id);
        if fails {
            return Err(IndexError::service(index, format!("injected failure for {}", doc_id)));
        }
        let mut indices = self.indices.write().map_err(|_| poisoned(index))?;
        let stored = indices.get_mut(index).ok_or_else(|| IndexError::NotFound {
            index: index.to_string(),
        })?;
        stored.docs.insert(doc_id.to_string(), document.clone());
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), IndexError> {
        let mut indices = self.indices.write().map_err(|_| poisoned(index))?;
        match indices.remove(index) {
            Some(_) => Ok(()),
            None => Err(IndexError::NotFound {
                index: index.to_string(),
            }),
        }
    }

    async fn get_document(&self, index: &str, doc_id: &str) -> Result<Option<Value>, IndexError> {
        let indices = self.indices.read().map_err(|_| poisoned(index))?;
        let stored = indices.get(index).ok_or_else(|| IndexError::NotFound {
            index: index.to_string(),
        })?;
        Ok(stored.docs.get(doc_id).cloned())
    }

    async fn count(&self, index: &str) -> Result<u64, IndexError> {
        let indices = self.indices.read().map_err(|_| poisoned(index))?;
        let stored = indices.get(index).ok_or_else(|| IndexError::NotFound {
            index: index.to_string(),
        })?;
        Ok(stored.docs.len() as u64)
    }
}
