//! Index lifecycle manager.
//!
//! Keeps the `captures-<type>` index mapping consistent with the schema
//! registry. The target mapping is the structural capture fields plus every
//! registry field plus the `custom_attrs` object.
//!
//! [`ensure_index`] creates a missing index, or diffs the live mapping
//! against the target and applies the difference. Additions go in one
//! update. Each type change goes in its own update so that a rejection only
//! affects that field: the service refuses incompatible changes, the field
//! keeps its old type, and the rejection is reported as a warning. Any
//! other service failure is returned to the caller.
//!
//! With no schema change, a repeat call performs only reads. A
//! [`RejectionMemo`] passed to [`ensure_index_with`] remembers refused type
//! changes so later calls skip them instead of sending the same update.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::Serialize;

use crate::index::{diff_mapping, IndexError, IndexMapping, IndexSettings, MappingDiff, SearchIndex};
use crate::schema::{CaptureSchema, FieldType, CUSTOM_ATTRS};

/// Capture fields present in every document regardless of type.
pub const STRUCTURAL_FIELDS: &[(&str, FieldType)] = &[
    ("capture_id", FieldType::Keyword),
    ("capture_type", FieldType::Keyword),
    ("channel", FieldType::Keyword),
    ("owner_id", FieldType::Keyword),
    ("top_level_dir", FieldType::Keyword),
    ("scan_group", FieldType::Keyword),
    ("is_multi_channel", FieldType::Boolean),
    ("created_at", FieldType::Date),
    ("updated_at", FieldType::Date),
];

/// Mapping derived from a schema.
pub fn target_mapping(schema: &CaptureSchema) -> IndexMapping {
    let mut mapping: IndexMapping = STRUCTURAL_FIELDS
        .iter()
        .map(|(name, ty)| (name.to_string(), *ty))
        .collect();
    for field in schema.fields() {
        mapping.insert(field.name.clone(), field.field_type);
    }
    mapping.insert(CUSTOM_ATTRS.to_string(), FieldType::Object);
    mapping
}

/// A mapping update the service refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedField {
    pub field: String,
    pub current: Option<FieldType>,
    pub target: FieldType,
    pub reason: String,
}

/// Outcome of [`ensure_index`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnsureReport {
    pub index: String,
    pub created: bool,
    /// Fields added to an existing index.
    pub added: Vec<String>,
    /// Fields whose type change the service accepted.
    pub updated: Vec<String>,
    pub rejected: Vec<RejectedField>,
    /// Type changes skipped because the service refused them before.
    pub skipped: Vec<String>,
}

impl EnsureReport {
    fn new(index: &str) -> Self {
        Self {
            index: index.to_string(),
            ..Default::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        !self.created && self.added.is_empty() && self.updated.is_empty() && self.rejected.is_empty()
    }
}

/// Type changes the search service has refused, keyed by index, field and
/// the (current, target) type pair.
#[derive(Debug, Default)]
pub struct RejectionMemo {
    refused: Mutex<HashSet<(String, String, FieldType, FieldType)>>,
}

impl RejectionMemo {
    pub fn new() -> Self {
        Self::default()
    }

    fn contains(&self, index: &str, field: &str, current: FieldType, target: FieldType) -> bool {
        let refused = self.refused.lock().unwrap_or_else(|e| e.into_inner());
        refused.contains(&(index.to_string(), field.to_string(), current, target))
    }

    fn record(&self, index: &str, field: &str, current: FieldType, target: FieldType) {
        self.refused
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((index.to_string(), field.to_string(), current, target));
    }

    /// Drop everything recorded for `index`, e.g. after it was recreated.
    pub fn forget_index(&self, index: &str) {
        self.refused
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(i, ..)| i != index);
    }

    pub fn len(&self) -> usize {
        self.refused.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ensure the index for `schema`'s capture type exists with a mapping
/// consistent with the schema.
///
/// Safe to run concurrently: losing a creation race is treated as "exists",
/// and a rejected update from either caller is reported, not raised.
/// Every type change is attempted; see [`ensure_index_with`] to skip
/// changes already refused.
pub async fn ensure_index(
    index: &dyn SearchIndex,
    schema: &CaptureSchema,
    settings: &IndexSettings,
) -> Result<EnsureReport, IndexError> {
    ensure_index_with(index, schema, settings, &RejectionMemo::new()).await
}

/// [`ensure_index`] that skips type changes recorded in `memo` and records
/// new rejections there.
pub async fn ensure_index_with(
    index: &dyn SearchIndex,
    schema: &CaptureSchema,
    settings: &IndexSettings,
    memo: &RejectionMemo,
) -> Result<EnsureReport, IndexError> {
    let name = schema.capture_type().index_name();
    let target = target_mapping(schema);
    let mut report = EnsureReport::new(&name);

    if !index.exists(&name).await? {
        match index.create(&name, &target, settings).await {
            Ok(()) => {
                tracing::info!(index = %name, fields = target.len(), "search index created");
                report.created = true;
                return Ok(report);
            }
            Err(IndexError::AlreadyExists { .. }) => {
                tracing::debug!(index = %name, "index created concurrently; reconciling mapping");
            }
            Err(e) => return Err(e),
        }
    }

    let current = index.get_mapping(&name).await?;
    let MappingDiff { added, changed } = diff_mapping(&current, &target);
    if added.is_empty() && changed.is_empty() {
        tracing::debug!(index = %name, "mapping up to date");
        return Ok(report);
    }

    if !added.is_empty() {
        match index.put_mapping(&name, &added).await {
            Ok(()) => {
                report.added = added.keys().cloned().collect();
                tracing::info!(index = %name, fields = ?report.added, "mapping fields added");
            }
            Err(IndexError::IncompatibleMapping { field, reason, .. }) => {
                // A concurrent writer added one of these with another type.
                let target_ty = added.get(&field).copied().unwrap_or(FieldType::Object);
                reject(&mut report, &name, field, None, target_ty, reason);
            }
            Err(e) => return Err(e),
        }
    }

    for (field, (current_ty, target_ty)) in changed {
        if memo.contains(&name, &field, current_ty, target_ty) {
            tracing::debug!(index = %name, field = %field, "type change refused earlier; skipping");
            report.skipped.push(field);
            continue;
        }
        let single: IndexMapping = [(field.clone(), target_ty)].into_iter().collect();
        match index.put_mapping(&name, &single).await {
            Ok(()) => {
                tracing::info!(index = %name, field = %field, from = %current_ty, to = %target_ty, "mapping field updated");
                report.updated.push(field);
            }
            Err(IndexError::IncompatibleMapping { reason, .. }) => {
                memo.record(&name, &field, current_ty, target_ty);
                reject(&mut report, &name, field, Some(current_ty), target_ty, reason);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

fn reject(
    report: &mut EnsureReport,
    index: &str,
    field: String,
    current: Option<FieldType>,
    target: FieldType,
    reason: String,
) {
    tracing::warn!(
        index,
        field = %field,
        target = %target,
        reason = %reason,
        "incompatible mapping update rejected; keeping existing mapping"
    );
    report.rejected.push(RejectedField {
        field,
        current,
        target,
        reason,
    });
}

/// Delete the index (if present) and create it fresh with the target
/// mapping. Documents are lost; callers follow up with a full reindex.
pub async fn recreate_index(
    index: &dyn SearchIndex,
    schema: &CaptureSchema,
    settings: &IndexSettings,
) -> Result<(), IndexError> {
    let name = schema.capture_type().index_name();
    match index.delete_index(&name).await {
        Ok(()) => tracing::warn!(index = %name, "search index deleted"),
        Err(IndexError::NotFound { .. }) => {}
        Err(e) => return Err(e),
    }
    index.create(&name, &target_mapping(schema), settings).await?;
    tracing::info!(index = %name, "search index recreated");
    Ok(())
}

/// Read-only view of an index against its target mapping.
#[derive(Debug, Clone)]
pub struct IndexInspection {
    pub index: String,
    pub exists: bool,
    pub current: IndexMapping,
    pub target: IndexMapping,
    pub diff: MappingDiff,
    pub documents: u64,
}

pub async fn inspect_index(
    index: &dyn SearchIndex,
    schema: &CaptureSchema,
) -> Result<IndexInspection, IndexError> {
    let name = schema.capture_type().index_name();
    let target = target_mapping(schema);
    let exists = index.exists(&name).await?;
    let (current, documents) = if exists {
        (index.get_mapping(&name).await?, index.count(&name).await?)
    } else {
        (IndexMapping::new(), 0)
    };
    let diff = diff_mapping(&current, &target);
    Ok(IndexInspection {
        index: name,
        exists,
        current,
        target,
        diff,
        documents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::InMemoryIndex;
    use crate::models::CaptureType;
    use crate::schema::SchemaRegistry;
    use async_trait::async_trait;
    use serde_json::Value;

    fn drf() -> CaptureSchema {
        SchemaRegistry::builtin()
            .schema(CaptureType::Drf)
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn creates_missing_index_with_target_mapping() {
        let index = InMemoryIndex::new();
        let schema = drf();
        let report = ensure_index(&index, &schema, &IndexSettings::default())
            .await
            .unwrap();
        assert!(report.created);
        let mapping = index.get_mapping("captures-drf").await.unwrap();
        assert_eq!(mapping, target_mapping(&schema));
        assert_eq!(mapping["custom_attrs"], FieldType::Object);
        assert_eq!(mapping["channel"], FieldType::Keyword);
    }

    #[tokio::test]
    async fn second_ensure_performs_no_writes() {
        let index = InMemoryIndex::new();
        let schema = drf();
        let settings = IndexSettings::default();
        ensure_index(&index, &schema, &settings).await.unwrap();
        let (creates, puts) = (index.create_calls(), index.put_mapping_calls());

        let report = ensure_index(&index, &schema, &settings).await.unwrap();
        assert!(report.is_noop());
        assert_eq!(index.create_calls(), creates);
        assert_eq!(index.put_mapping_calls(), puts);
    }

    #[tokio::test]
    async fn rejected_type_change_is_a_warning() {
        let index = InMemoryIndex::new();
        let schema = drf();
        // Older mapping: gain as keyword, span missing.
        let mut old = target_mapping(&schema);
        old.insert("gain".into(), FieldType::Keyword);
        old.remove("span");
        index
            .create("captures-drf", &old, &IndexSettings::default())
            .await
            .unwrap();

        let report = ensure_index(&index, &schema, &IndexSettings::default())
            .await
            .unwrap();
        assert_eq!(report.added, vec!["span".to_string()]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].field, "gain");
        assert_eq!(report.rejected[0].current, Some(FieldType::Keyword));

        let mapping = index.get_mapping("captures-drf").await.unwrap();
        assert_eq!(mapping["gain"], FieldType::Keyword);
        assert_eq!(mapping["span"], FieldType::Double);
    }

    #[tokio::test]
    async fn refused_change_is_not_resent() {
        let index = InMemoryIndex::new();
        let schema = drf();
        let mut old = target_mapping(&schema);
        old.insert("gain".into(), FieldType::Keyword);
        index
            .create("captures-drf", &old, &IndexSettings::default())
            .await
            .unwrap();
        let memo = RejectionMemo::new();

        let first = ensure_index_with(&index, &schema, &IndexSettings::default(), &memo)
            .await
            .unwrap();
        assert_eq!(first.rejected.len(), 1);
        assert_eq!(memo.len(), 1);
        let puts = index.put_mapping_calls();

        let second = ensure_index_with(&index, &schema, &IndexSettings::default(), &memo)
            .await
            .unwrap();
        assert!(second.is_noop());
        assert_eq!(second.skipped, vec!["gain".to_string()]);
        assert_eq!(index.put_mapping_calls(), puts);

        memo.forget_index("captures-drf");
        assert!(memo.is_empty());
    }

    #[tokio::test]
    async fn extra_live_fields_are_left_alone() {
        let index = InMemoryIndex::new();
        let schema = drf();
        let mut old = target_mapping(&schema);
        old.insert("legacy_field".into(), FieldType::Text);
        index
            .create("captures-drf", &old, &IndexSettings::default())
            .await
            .unwrap();
        let report = ensure_index(&index, &schema, &IndexSettings::default())
            .await
            .unwrap();
        assert!(report.is_noop());
        assert_eq!(index.put_mapping_calls(), 0);
    }

    /// Reports the index as missing even when it exists, as a caller that
    /// lost a creation race would observe.
    struct RacingIndex(InMemoryIndex);

    #[async_trait]
    impl SearchIndex for RacingIndex {
        async fn exists(&self, _index: &str) -> Result<bool, IndexError> {
            Ok(false)
        }
        async fn create(&self, i: &str, m: &IndexMapping, s: &IndexSettings) -> Result<(), IndexError> {
            self.0.create(i, m, s).await
        }
        async fn get_mapping(&self, i: &str) -> Result<IndexMapping, IndexError> {
            self.0.get_mapping(i).await
        }
        async fn put_mapping(&self, i: &str, m: &IndexMapping) -> Result<(), IndexError> {
            self.0.put_mapping(i, m).await
        }
        async fn upsert(&self, i: &str, id: &str, d: &Value) -> Result<(), IndexError> {
            self.0.upsert(i, id, d).await
        }
        async fn delete_index(&self, i: &str) -> Result<(), IndexError> {
            self.0.delete_index(i).await
        }
        async fn get_document(&self, i: &str, id: &str) -> Result<Option<Value>, IndexError> {
            self.0.get_document(i, id).await
        }
        async fn count(&self, i: &str) -> Result<u64, IndexError> {
            self.0.count(i).await
        }
    }

    #[tokio::test]
    async fn losing_a_creation_race_is_not_fatal() {
        let index = RacingIndex(InMemoryIndex::new());
        let schema = drf();
        let settings = IndexSettings::default();
        assert!(ensure_index(&index, &schema, &settings).await.unwrap().created);

        let second = ensure_index(&index, &schema, &settings).await.unwrap();
        assert!(!second.created);
        assert!(second.rejected.is_empty());
    }

    #[tokio::test]
    async fn recreate_drops_documents() {
        let index = InMemoryIndex::new();
        let schema = drf();
        let settings = IndexSettings::default();
        ensure_index(&index, &schema, &settings).await.unwrap();
        index
            .upsert("captures-drf", "a", &serde_json::json!({}))
            .await
            .unwrap();

        recreate_index(&index, &schema, &settings).await.unwrap();
        let inspection = inspect_index(&index, &schema).await.unwrap();
        assert!(inspection.exists);
        assert_eq!(inspection.documents, 0);
        assert!(inspection.diff.is_empty());
    }
}
