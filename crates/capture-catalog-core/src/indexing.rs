//! Indexing orchestrator.
//!
//! [`Indexer::ingest`] runs the per-capture pipeline:
//!
//! 1. ensure the capture type's index and mapping ([`crate::lifecycle`]);
//! 2. obtain the normalized property map (archive extraction for
//!    archive-backed types, schema validation of the stored metadata
//!    otherwise);
//! 3. build the document from the structural capture fields and the map;
//! 4. upsert it keyed by capture id, so re-ingesting overwrites.
//!
//! [`Indexer::reindex_all`] ingests every non-deleted capture of a type
//! with bounded concurrency. A failing capture is recorded in the report
//! and the batch carries on.
//!
//! Collaborators are passed in at construction and shared via `Arc`, so
//! tests can substitute in-memory implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::archive::ArchiveReader;
use crate::extract::{extract_metadata, ExtractError};
use crate::index::{IndexError, IndexSettings, SearchIndex};
use crate::lifecycle::{self, EnsureReport, IndexInspection, RejectionMemo};
use crate::models::{Capture, CaptureType};
use crate::schema::{
    CaptureSchema, SchemaRegistry, ValidatedMetadata, ValidationWarning, CUSTOM_ATTRS,
};
use crate::store::{CaptureFilter, CatalogStore};

/// Options for [`Indexer::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Check the capture's channel exists in its archive before extracting.
    pub validate_files: bool,
    /// Write the normalized map back to the capture record.
    pub persist_metadata: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            validate_files: false,
            persist_metadata: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("capture {capture_id} not found")]
    NotFound { capture_id: Uuid },

    #[error("capture {capture_id} is deleted")]
    Deleted { capture_id: Uuid },

    #[error("capture {capture_id}: channel '{channel}' is not present in {}", path.display())]
    MissingChannel {
        capture_id: Uuid,
        channel: String,
        path: PathBuf,
    },

    #[error("capture {capture_id}: extraction failed: {source}")]
    Extraction {
        capture_id: Uuid,
        #[source]
        source: ExtractError,
    },

    #[error("capture {capture_id}: search index failure: {source}")]
    Index {
        capture_id: Uuid,
        #[source]
        source: IndexError,
    },

    #[error("capture {capture_id}: no schema registered: {message}")]
    Schema { capture_id: Uuid, message: String },

    #[error("capture {capture_id}: {message}")]
    Store { capture_id: Uuid, message: String },
}

impl IngestError {
    pub fn capture_id(&self) -> Uuid {
        match self {
            IngestError::NotFound { capture_id }
            | IngestError::Deleted { capture_id }
            | IngestError::MissingChannel { capture_id, .. }
            | IngestError::Extraction { capture_id, .. }
            | IngestError::Index { capture_id, .. }
            | IngestError::Schema { capture_id, .. }
            | IngestError::Store { capture_id, .. } => *capture_id,
        }
    }

    fn store(capture_id: Uuid, err: anyhow::Error) -> Self {
        IngestError::Store {
            capture_id,
            message: format!("{:#}", err),
        }
    }
}

/// Result of a successful ingest.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub capture_id: Uuid,
    pub index: String,
    pub document: Value,
    pub warnings: Vec<ValidationWarning>,
    /// Present when this ingest ran the mapping check itself.
    pub ensure: Option<EnsureReport>,
}

/// A batch item that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub capture_id: Uuid,
    pub reason: String,
}

/// Outcome of a bulk reindex.
#[derive(Debug, Clone, Serialize)]
pub struct ReindexReport {
    pub capture_type: CaptureType,
    pub ensure: EnsureReport,
    pub total: usize,
    pub indexed: usize,
    pub failed: Vec<FailedItem>,
}

/// Emitted after each batch item completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReindexProgress {
    pub done: usize,
    pub total: usize,
    pub failed: usize,
}

/// Build the index document for a capture: the normalized map overlaid
/// with the structural capture fields. Metadata keys that collide with a
/// structural field are kept under `custom_attrs`.
pub fn build_document(capture: &Capture, metadata: &Map<String, Value>) -> Value {
    let mut doc = metadata.clone();
    let displaced: Vec<(String, Value)> = lifecycle::STRUCTURAL_FIELDS
        .iter()
        .filter_map(|(key, _)| doc.remove(*key).map(|v| (key.to_string(), v)))
        .collect();
    if !displaced.is_empty() {
        let attrs = doc
            .entry(CUSTOM_ATTRS)
            .or_insert_with(|| Value::Object(Map::new()));
        if !attrs.is_object() {
            *attrs = Value::Object(Map::new());
        }
        if let Value::Object(attrs) = attrs {
            for (key, value) in displaced {
                attrs.entry(key).or_insert(value);
            }
        }
    }
    doc.insert("capture_id".into(), Value::String(capture.id.to_string()));
    doc.insert(
        "capture_type".into(),
        Value::String(capture.capture_type.as_str().to_string()),
    );
    doc.insert("channel".into(), Value::String(capture.channel.clone()));
    doc.insert("owner_id".into(), Value::String(capture.owner_id.to_string()));
    doc.insert(
        "top_level_dir".into(),
        Value::String(capture.top_level_dir.clone()),
    );
    doc.insert(
        "scan_group".into(),
        capture
            .scan_group
            .map(|g| Value::String(g.to_string()))
            .unwrap_or(Value::Null),
    );
    doc.insert("is_multi_channel".into(), Value::Bool(capture.is_multi_channel));
    doc.insert("created_at".into(), Value::String(capture.created_at.to_rfc3339()));
    doc.insert("updated_at".into(), Value::String(capture.updated_at.to_rfc3339()));
    Value::Object(doc)
}

/// Drives ingestion into the search index.
pub struct Indexer {
    store: Arc<dyn CatalogStore>,
    index: Arc<dyn SearchIndex>,
    archive: Arc<dyn ArchiveReader>,
    registry: Arc<SchemaRegistry>,
    settings: IndexSettings,
    archive_root: PathBuf,
    concurrency: usize,
    rejections: RejectionMemo,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        index: Arc<dyn SearchIndex>,
        archive: Arc<dyn ArchiveReader>,
    ) -> Self {
        Self {
            store,
            index,
            archive,
            registry: Arc::new(SchemaRegistry::builtin()),
            settings: IndexSettings::default(),
            archive_root: PathBuf::from("/"),
            concurrency: 4,
            rejections: RejectionMemo::new(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_settings(mut self, settings: IndexSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Directory that capture `top_level_dir`s are resolved against.
    pub fn with_archive_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.archive_root = root.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Archive directory backing a capture. Only normal segments of
    /// `top_level_dir` are joined, so the result stays under the root.
    pub fn archive_path(&self, capture: &Capture) -> PathBuf {
        capture
            .top_level_dir
            .split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .fold(self.archive_root.clone(), |path, segment| path.join(segment))
    }

    fn schema(&self, capture_type: CaptureType) -> anyhow::Result<&CaptureSchema> {
        self.registry.schema(capture_type)
    }

    pub async fn ensure_index(&self, capture_type: CaptureType) -> anyhow::Result<EnsureReport> {
        let schema = self.schema(capture_type)?;
        Ok(lifecycle::ensure_index_with(
            self.index.as_ref(),
            schema,
            &self.settings,
            &self.rejections,
        )
        .await?)
    }

    pub async fn inspect_index(&self, capture_type: CaptureType) -> anyhow::Result<IndexInspection> {
        let schema = self.schema(capture_type)?;
        Ok(lifecycle::inspect_index(self.index.as_ref(), schema).await?)
    }

    /// Ingest one capture into its type's index.
    pub async fn ingest(
        &self,
        capture: &Capture,
        options: IngestOptions,
    ) -> Result<IngestOutcome, IngestError> {
        self.ingest_with(capture, options, true).await
    }

    /// Load a capture by id and ingest it.
    pub async fn ingest_by_id(
        &self,
        capture_id: Uuid,
        options: IngestOptions,
    ) -> Result<IngestOutcome, IngestError> {
        let capture = self
            .store
            .get_capture(capture_id)
            .await
            .map_err(|e| IngestError::store(capture_id, e))?
            .ok_or(IngestError::NotFound { capture_id })?;
        self.ingest(&capture, options).await
    }

    async fn ingest_with(
        &self,
        capture: &Capture,
        options: IngestOptions,
        ensure: bool,
    ) -> Result<IngestOutcome, IngestError> {
        let capture_id = capture.id;
        if capture.is_deleted {
            return Err(IngestError::Deleted { capture_id });
        }
        let schema = self
            .schema(capture.capture_type)
            .map_err(|e| IngestError::Schema {
                capture_id,
                message: format!("{:#}", e),
            })?;
        let index_name = capture.capture_type.index_name();

        let ensure = if ensure {
            let report = lifecycle::ensure_index_with(
                self.index.as_ref(),
                schema,
                &self.settings,
                &self.rejections,
            )
            .await
            .map_err(|source| IngestError::Index { capture_id, source })?;
            Some(report)
        } else {
            None
        };

        let validated = self.normalized_metadata(capture, schema, options)?;
        let metadata = validated.to_map();
        let document = build_document(capture, &metadata);

        self.index
            .upsert(&index_name, &capture_id.to_string(), &document)
            .await
            .map_err(|source| IngestError::Index { capture_id, source })?;

        if options.persist_metadata && metadata != capture.metadata {
            self.store
                .update_capture_metadata(capture_id, &metadata)
                .await
                .map_err(|e| IngestError::store(capture_id, e))?;
        }

        tracing::info!(
            capture = %capture_id,
            index = %index_name,
            warnings = validated.warnings.len(),
            "capture indexed"
        );

        Ok(IngestOutcome {
            capture_id,
            index: index_name,
            document,
            warnings: validated.warnings,
            ensure,
        })
    }

    /// Archive-backed types are extracted from the archive; the others
    /// validate the metadata supplied with the capture record.
    fn normalized_metadata(
        &self,
        capture: &Capture,
        schema: &CaptureSchema,
        options: IngestOptions,
    ) -> Result<ValidatedMetadata, IngestError> {
        if !capture.capture_type.is_archive_backed() {
            return Ok(schema.validate(&capture.metadata));
        }

        let path = self.archive_path(capture);
        if options.validate_files {
            self.check_channel(capture, &path)?;
        }
        extract_metadata(self.archive.as_ref(), schema, &path, &capture.channel).map_err(
            |source| IngestError::Extraction {
                capture_id: capture.id,
                source,
            },
        )
    }

    fn check_channel(&self, capture: &Capture, path: &Path) -> Result<(), IngestError> {
        let extraction = |source| IngestError::Extraction {
            capture_id: capture.id,
            source: ExtractError::Open {
                path: path.to_path_buf(),
                source,
            },
        };
        let handle = self.archive.open(path).map_err(extraction)?;
        let channels = handle.channels().map_err(extraction)?;
        if channels.iter().any(|c| c == &capture.channel) {
            Ok(())
        } else {
            Err(IngestError::MissingChannel {
                capture_id: capture.id,
                channel: capture.channel.clone(),
                path: path.to_path_buf(),
            })
        }
    }

    /// Ingest every non-deleted capture of `capture_type`.
    ///
    /// The mapping check runs once for the batch; if it fails the batch
    /// does not start. Per-capture failures are logged and reported.
    pub async fn reindex_all(
        &self,
        capture_type: CaptureType,
        options: IngestOptions,
        progress: &dyn Fn(ReindexProgress),
    ) -> anyhow::Result<ReindexReport> {
        let ensure = self.ensure_index(capture_type).await?;
        let captures = self
            .store
            .list_captures(&CaptureFilter::of_type(capture_type))
            .await?;
        let total = captures.len();
        tracing::info!(capture_type = %capture_type, total, "reindex started");

        let mut results = stream::iter(captures.iter())
            .map(|capture| self.ingest_with(capture, options, false))
            .buffer_unordered(self.concurrency);

        let mut indexed = 0;
        let mut failed = Vec::new();
        while let Some(result) = results.next().await {
            match result {
                Ok(_) => indexed += 1,
                Err(e) => {
                    tracing::warn!(capture = %e.capture_id(), error = %e, "capture failed to index");
                    failed.push(FailedItem {
                        capture_id: e.capture_id(),
                        reason: e.to_string(),
                    });
                }
            }
            progress(ReindexProgress {
                done: indexed + failed.len(),
                total,
                failed: failed.len(),
            });
        }

        failed.sort_by_key(|f| f.capture_id);
        tracing::info!(
            capture_type = %capture_type,
            total,
            indexed,
            failed = failed.len(),
            "reindex finished"
        );
        Ok(ReindexReport {
            capture_type,
            ensure,
            total,
            indexed,
            failed,
        })
    }

    /// Delete and recreate the index, then reindex every capture of the type.
    pub async fn reset_index(
        &self,
        capture_type: CaptureType,
        options: IngestOptions,
        progress: &dyn Fn(ReindexProgress),
    ) -> anyhow::Result<ReindexReport> {
        let schema = self.schema(capture_type)?;
        lifecycle::recreate_index(self.index.as_ref(), schema, &self.settings).await?;
        self.rejections.forget_index(&capture_type.index_name());
        self.reindex_all(capture_type, options, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::{InMemoryArchive, InMemoryChannel};
    use crate::index::memory::InMemoryIndex;
    use crate::store::memory::InMemoryStore;
    use serde_json::json;
    use std::sync::Mutex;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn channel() -> InMemoryChannel {
        InMemoryChannel::new(
            1_000_000,
            1_150_000,
            obj(json!({ "samples_per_second": 150000, "vendor_note": "roof" })),
        )
        .with_metadata(vec![(0, obj(json!({ "center_freq": "100000000" })))])
    }

    struct Harness {
        store: Arc<InMemoryStore>,
        index: Arc<InMemoryIndex>,
        indexer: Indexer,
    }

    fn harness(archive: InMemoryArchive) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let index = Arc::new(InMemoryIndex::new());
        let indexer = Indexer::new(store.clone(), index.clone(), Arc::new(archive))
            .with_archive_root("/archive")
            .with_concurrency(2);
        Harness {
            store,
            index,
            indexer,
        }
    }

    async fn drf_capture(store: &InMemoryStore, dir: &str, ch: &str) -> Capture {
        let capture = Capture::new(Uuid::new_v4(), CaptureType::Drf, ch, dir);
        store.insert_capture(&capture).await.unwrap();
        capture
    }

    #[tokio::test]
    async fn ingest_builds_document_and_persists_metadata() {
        let h = harness(InMemoryArchive::new().with_channel("/archive/run-42", "ch0", channel()));
        let capture = drf_capture(&h.store, "/run-42", "ch0").await;

        let outcome = h.indexer.ingest(&capture, IngestOptions::default()).await.unwrap();
        assert_eq!(outcome.index, "captures-drf");
        assert!(outcome.ensure.unwrap().created);

        let doc = h
            .index
            .get_document("captures-drf", &capture.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["channel"], json!("ch0"));
        assert_eq!(doc["top_level_dir"], json!("/run-42"));
        assert_eq!(doc["center_freq"], json!(100000000.0));
        assert_eq!(doc["custom_attrs"]["vendor_note"], json!("roof"));

        let stored = h.store.get_capture(capture.id).await.unwrap().unwrap();
        assert_eq!(stored.metadata["center_freq"], json!(100000000.0));
    }

    #[tokio::test]
    async fn reingest_overwrites_single_document() {
        let h = harness(InMemoryArchive::new().with_channel("/archive/run-42", "ch0", channel()));
        let capture = drf_capture(&h.store, "/run-42", "ch0").await;

        h.indexer.ingest(&capture, IngestOptions::default()).await.unwrap();
        let puts = h.index.put_mapping_calls();
        h.indexer.ingest(&capture, IngestOptions::default()).await.unwrap();

        assert_eq!(h.index.count("captures-drf").await.unwrap(), 1);
        assert_eq!(h.index.put_mapping_calls(), puts);
    }

    #[tokio::test]
    async fn missing_archive_is_an_extraction_failure() {
        let h = harness(InMemoryArchive::new());
        let capture = drf_capture(&h.store, "/nowhere", "ch0").await;
        let err = h
            .indexer
            .ingest(&capture, IngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Extraction { .. }));
        assert_eq!(err.capture_id(), capture.id);
    }

    #[tokio::test]
    async fn validate_files_reports_missing_channel() {
        let h = harness(InMemoryArchive::new().with_channel("/archive/run-42", "ch0", channel()));
        let capture = drf_capture(&h.store, "/run-42", "ch9").await;
        let options = IngestOptions {
            validate_files: true,
            ..Default::default()
        };
        let err = h.indexer.ingest(&capture, options).await.unwrap_err();
        assert!(matches!(err, IngestError::MissingChannel { ref channel, .. } if channel == "ch9"));
    }

    #[tokio::test]
    async fn non_archive_types_validate_stored_metadata() {
        let h = harness(InMemoryArchive::new());
        let mut capture = Capture::new(Uuid::new_v4(), CaptureType::RadioHound, "sweep", "/rh/node-1");
        capture.metadata = obj(json!({
            "metadata.center_frequency": "2.4e9",
            "sample_rate": 10000000,
            "timestamp": "2024-03-01T00:00:00Z",
            "extra": 1
        }));
        h.store.insert_capture(&capture).await.unwrap();

        h.indexer
            .ingest(&capture, IngestOptions::default())
            .await
            .unwrap();
        let doc = h
            .index
            .get_document("captures-rh", &capture.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["center_frequency"], json!(2.4e9));
        assert_eq!(doc["custom_attrs"]["extra"], json!(1));
    }

    #[tokio::test]
    async fn batch_isolates_failures() {
        let archive = InMemoryArchive::new()
            .with_channel("/archive/run-1", "ch0", channel())
            .with_channel("/archive/run-1", "ch1", channel())
            .with_channel("/archive/run-2", "ch0", channel());
        let h = harness(archive);
        let a = drf_capture(&h.store, "/run-1", "ch0").await;
        let b = drf_capture(&h.store, "/run-1", "ch1").await;
        let c = drf_capture(&h.store, "/run-2", "ch0").await;
        let missing = drf_capture(&h.store, "/run-3", "ch0").await;
        h.index.fail_upserts_for(b.id.to_string());

        let seen = Mutex::new(Vec::new());
        let report = h
            .indexer
            .reindex_all(CaptureType::Drf, IngestOptions::default(), &|p| {
                seen.lock().unwrap().push(p)
            })
            .await
            .unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.indexed, 2);
        let mut expected = vec![b.id, missing.id];
        expected.sort();
        let failed: Vec<Uuid> = report.failed.iter().map(|f| f.capture_id).collect();
        assert_eq!(failed, expected);

        for id in [a.id, c.id] {
            assert!(h
                .index
                .get_document("captures-drf", &id.to_string())
                .await
                .unwrap()
                .is_some());
        }
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen.last().unwrap().failed, 2);
    }

    #[tokio::test]
    async fn reindex_skips_deleted_captures() {
        let h = harness(InMemoryArchive::new().with_channel("/archive/run-1", "ch0", channel()));
        let live = drf_capture(&h.store, "/run-1", "ch0").await;
        let gone = drf_capture(&h.store, "/run-1", "ch1").await;
        h.store.soft_delete_capture(gone.id).await.unwrap();

        let report = h
            .indexer
            .reindex_all(CaptureType::Drf, IngestOptions::default(), &|_| {})
            .await
            .unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.indexed, 1);
        assert!(h
            .index
            .get_document("captures-drf", &live.id.to_string())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn reset_recreates_and_repopulates() {
        let h = harness(InMemoryArchive::new().with_channel("/archive/run-1", "ch0", channel()));
        let capture = drf_capture(&h.store, "/run-1", "ch0").await;
        h.indexer.ingest(&capture, IngestOptions::default()).await.unwrap();
        h.index
            .upsert("captures-drf", "stale", &json!({}))
            .await
            .unwrap();

        let report = h
            .indexer
            .reset_index(CaptureType::Drf, IngestOptions::default(), &|_| {})
            .await
            .unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(h.index.count("captures-drf").await.unwrap(), 1);
        assert!(h
            .index
            .get_document("captures-drf", "stale")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn channel_without_sample_rate_is_still_indexed() {
        let no_rate = InMemoryChannel::new(0, 10, obj(json!({ "center_freq": 1.0e8, "gain": 3 })));
        let h = harness(InMemoryArchive::new().with_channel("/archive/run-7", "ch0", no_rate));
        let capture = drf_capture(&h.store, "/run-7", "ch0").await;

        let outcome = h.indexer.ingest(&capture, IngestOptions::default()).await.unwrap();
        assert!(outcome.warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::MissingRequired { field } if field == "samples_per_second"
        )));

        let doc = h
            .index
            .get_document("captures-drf", &capture.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["center_freq"], json!(1.0e8));
        assert!(doc.get("start_bound").is_none());
    }

    #[tokio::test]
    async fn unregistered_type_is_a_schema_failure() {
        let drf_only = SchemaRegistry::builtin()
            .schema(CaptureType::Drf)
            .unwrap()
            .clone();
        let h = harness(InMemoryArchive::new());
        let indexer = h
            .indexer
            .with_registry(Arc::new(SchemaRegistry::empty().with_schema(drf_only)));
        let capture = Capture::new(Uuid::new_v4(), CaptureType::SigMf, "c0", "/sig/1");
        h.store.insert_capture(&capture).await.unwrap();

        let err = indexer
            .ingest(&capture, IngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Schema { .. }), "{}", err);
        assert_eq!(err.capture_id(), capture.id);
    }

    #[test]
    fn archive_path_stays_under_root() {
        let h = harness(InMemoryArchive::new());
        let mut capture = Capture::new(Uuid::new_v4(), CaptureType::Drf, "ch0", "/run-1");
        capture.top_level_dir = "/../../etc//run".to_string();
        assert_eq!(h.indexer.archive_path(&capture), PathBuf::from("/archive/etc/run"));
    }

    #[tokio::test]
    async fn concurrent_ingests_converge() {
        let h = harness(InMemoryArchive::new().with_channel("/archive/run-42", "ch0", channel()));
        let capture = drf_capture(&h.store, "/run-42", "ch0").await;

        let (a, b) = futures::join!(
            h.indexer.ingest(&capture, IngestOptions::default()),
            h.indexer.ingest(&capture, IngestOptions::default())
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(h.index.count("captures-drf").await.unwrap(), 1);

        let mapping = h.index.get_mapping("captures-drf").await.unwrap();
        let report = h.indexer.ensure_index(CaptureType::Drf).await.unwrap();
        assert!(report.is_noop());
        assert_eq!(h.index.get_mapping("captures-drf").await.unwrap(), mapping);
    }

    #[test]
    fn document_carries_structural_fields() {
        let mut capture = Capture::new(Uuid::new_v4(), CaptureType::Drf, "ch0", "/run");
        capture.scan_group = Some(Uuid::new_v4());
        let mut metadata = Map::new();
        metadata.insert("channel".into(), json!("spoofed"));
        metadata.insert("created_at".into(), json!("1999-01-01"));
        let doc = build_document(&capture, &metadata);
        assert_eq!(doc["channel"], json!("ch0"));
        assert_eq!(doc["capture_type"], json!("drf"));
        assert_eq!(doc["custom_attrs"]["channel"], json!("spoofed"));
        assert_eq!(doc["custom_attrs"]["created_at"], json!("1999-01-01"));
        assert_eq!(
            doc["scan_group"],
            json!(capture.scan_group.unwrap().to_string())
        );
    }
}
