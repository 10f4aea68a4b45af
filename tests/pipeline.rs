//! End-to-end tests over the native seams.
//!
//! The SQLite store and the filesystem archive reader are the real
//! implementations; the search index is the in-memory one, so no index
//! service is needed.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tempfile::TempDir;

use capture_catalog::archive_fs::FsArchiveReader;
use capture_catalog::config::load_config;
use capture_catalog::sqlite_store::SqliteStore;
use capture_catalog::{db, migrate};
use capture_catalog_core::access;
use capture_catalog_core::index::memory::InMemoryIndex;
use capture_catalog_core::index::SearchIndex;
use capture_catalog_core::indexing::{IngestError, IngestOptions, Indexer};
use capture_catalog_core::models::{
    Capture, CaptureType, Dataset, ObjectRef, PermissionLevel, User,
};
use capture_catalog_core::registration::{register_archive, register_capture};
use capture_catalog_core::sharing;
use capture_catalog_core::store::{CaptureFilter, CatalogStore};

// ─── Fixtures ───────────────────────────────────────────────────────

struct Env {
    _tmp: TempDir,
    archives: std::path::PathBuf,
    store: Arc<SqliteStore>,
}

async fn setup() -> Env {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let archives = root.join("archives");
    fs::create_dir_all(&archives).unwrap();
    let config_path = root.join("capcat.toml");
    fs::write(
        &config_path,
        format!(
            "[db]\npath = \"{}/catalog.sqlite\"\n\n[index]\nurl = \"http://127.0.0.1:9\"\n\n[archive]\nroot = \"{}\"\n",
            root.display(),
            archives.display()
        ),
    )
    .unwrap();
    let config = load_config(&config_path).unwrap();
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    // Migrations are idempotent.
    migrate::apply(&pool).await.unwrap();
    Env {
        _tmp: tmp,
        archives,
        store: Arc::new(SqliteStore::new(pool)),
    }
}

fn write_channel(archive: &Path, channel: &str, metadata: Value) {
    let dir = archive.join(channel);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("properties.json"),
        json!({
            "start_index": 1_500_000u64,
            "end_index": 3_000_000u64,
            "properties": { "samples_per_second": 150000, "is_complex": true }
        })
        .to_string(),
    )
    .unwrap();
    fs::write(dir.join("metadata.json"), metadata.to_string()).unwrap();
}

fn indexer(env: &Env, index: Arc<InMemoryIndex>) -> Indexer {
    Indexer::new(
        env.store.clone() as Arc<dyn CatalogStore>,
        index,
        Arc::new(FsArchiveReader::new()),
    )
    .with_archive_root(&env.archives)
    .with_concurrency(2)
}

async fn user(store: &SqliteStore, email: &str, name: Option<&str>) -> User {
    let user = User::new(email, name.map(str::to_string));
    store.upsert_user(&user).await.unwrap();
    user
}

// ─── Indexing ───────────────────────────────────────────────────────

#[tokio::test]
async fn drf_archive_registers_and_reindexes() {
    let env = setup().await;
    let run = env.archives.join("run-7");
    write_channel(
        &run,
        "ch0",
        json!([
            { "index": 0, "values": { "center_freq": 1.0e8, "gain": 10.0 } },
            { "index": 1_000_000, "values": { "gain": 25.0 } }
        ]),
    );
    write_channel(&run, "ch1", json!([{ "index": 0, "values": { "center_freq": 2.0e8 } }]));
    let alice = user(&env.store, "alice@example.org", Some("Alice")).await;

    let captures = register_archive(
        env.store.as_ref(),
        &FsArchiveReader::new(),
        alice.id,
        CaptureType::Drf,
        &run,
        "/run-7",
    )
    .await
    .unwrap();
    assert_eq!(captures.len(), 2);
    assert!(captures.iter().all(|c| c.is_multi_channel));
    assert_eq!(captures[0].scan_group, captures[1].scan_group);

    let index = Arc::new(InMemoryIndex::new());
    let indexer = indexer(&env, index.clone());
    let report = indexer
        .reindex_all(CaptureType::Drf, IngestOptions::default(), &|_| {})
        .await
        .unwrap();
    assert!(report.ensure.created);
    assert_eq!(report.total, 2);
    assert_eq!(report.indexed, 2);
    assert!(report.failed.is_empty());
    assert_eq!(index.count("captures-drf").await.unwrap(), 2);

    let ch0 = captures.iter().find(|c| c.channel == "ch0").unwrap();
    let doc = index
        .get_document("captures-drf", &ch0.id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["center_freq"], json!(1.0e8));
    assert_eq!(doc["gain"], json!(25.0));
    assert_eq!(doc["start_bound"], json!(10.0));
    assert_eq!(doc["channel"], json!("ch0"));
    assert_eq!(doc["top_level_dir"], json!("/run-7"));

    let stored = env.store.get_capture(ch0.id).await.unwrap().unwrap();
    assert_eq!(stored.metadata["center_freq"], json!(1.0e8));

    // A second run overwrites the same documents.
    let again = indexer
        .reindex_all(CaptureType::Drf, IngestOptions::default(), &|_| {})
        .await
        .unwrap();
    assert!(again.ensure.is_noop());
    assert_eq!(index.count("captures-drf").await.unwrap(), 2);
}

#[tokio::test]
async fn missing_archive_fails_only_its_capture() {
    let env = setup().await;
    write_channel(
        &env.archives.join("present"),
        "ch0",
        json!([{ "index": 0, "values": { "center_freq": 1.0e8 } }]),
    );
    let alice = user(&env.store, "alice@example.org", None).await;
    let good = Capture::new(alice.id, CaptureType::Drf, "ch0", "/present");
    let missing = Capture::new(alice.id, CaptureType::Drf, "ch0", "/absent");
    env.store.insert_capture(&good).await.unwrap();
    env.store.insert_capture(&missing).await.unwrap();

    let index = Arc::new(InMemoryIndex::new());
    let report = indexer(&env, index.clone())
        .reindex_all(CaptureType::Drf, IngestOptions::default(), &|_| {})
        .await
        .unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].capture_id, missing.id);
    assert!(index
        .get_document("captures-drf", &good.id.to_string())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn validate_files_rejects_absent_channel() {
    let env = setup().await;
    write_channel(
        &env.archives.join("run"),
        "ch0",
        json!([{ "index": 0, "values": { "center_freq": 1.0e8 } }]),
    );
    let alice = user(&env.store, "alice@example.org", None).await;
    let capture = Capture::new(alice.id, CaptureType::Drf, "ch9", "/run");
    env.store.insert_capture(&capture).await.unwrap();

    let err = indexer(&env, Arc::new(InMemoryIndex::new()))
        .ingest_by_id(
            capture.id,
            IngestOptions {
                validate_files: true,
                persist_metadata: true,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::MissingChannel { .. }), "got {:?}", err);
}

#[tokio::test]
async fn radiohound_metadata_is_validated_from_the_record() {
    let env = setup().await;
    let alice = user(&env.store, "alice@example.org", None).await;
    let metadata: Map<String, Value> = json!({
        "center_frequency": "915000000",
        "sample_rate": 2.4e6,
        "timestamp": "2024-05-01T12:00:00Z",
        "gain": "not-a-number",
        "operator_note": "rooftop"
    })
    .as_object()
    .cloned()
    .unwrap();
    let capture = register_capture(
        env.store.as_ref(),
        alice.id,
        CaptureType::RadioHound,
        "rh0",
        "/sweeps/a",
        metadata,
    )
    .await
    .unwrap();

    let index = Arc::new(InMemoryIndex::new());
    let outcome = indexer(&env, index.clone())
        .ingest(&capture, IngestOptions::default())
        .await
        .unwrap();
    assert!(!outcome.warnings.is_empty());
    assert_eq!(outcome.document["center_frequency"], json!(915000000.0));
    assert!(outcome.document.get("gain").is_none());
    assert_eq!(outcome.document["custom_attrs"]["operator_note"], json!("rooftop"));
}

// ─── Relational invariants ──────────────────────────────────────────

#[tokio::test]
async fn capture_identity_is_unique_until_deleted() {
    let env = setup().await;
    let alice = user(&env.store, "alice@example.org", None).await;
    let bob = user(&env.store, "bob@example.org", None).await;

    let first = Capture::new(alice.id, CaptureType::Drf, "ch0", "/run");
    env.store.insert_capture(&first).await.unwrap();
    let dup = Capture::new(alice.id, CaptureType::Drf, "ch0", "/run");
    assert!(env.store.insert_capture(&dup).await.is_err());

    // Another owner may use the same directory and channel.
    let other = Capture::new(bob.id, CaptureType::Drf, "ch0", "/run");
    env.store.insert_capture(&other).await.unwrap();

    env.store.soft_delete_capture(first.id).await.unwrap();
    assert!(env.store.get_capture(first.id).await.unwrap().is_none());
    env.store.insert_capture(&dup).await.unwrap();

    let listed = env
        .store
        .list_captures(&CaptureFilter {
            owner_id: Some(alice.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, dup.id);
}

#[tokio::test]
async fn email_lookup_ignores_case() {
    let env = setup().await;
    let alice = user(&env.store, "Alice@Example.org", None).await;
    let found = env
        .store
        .find_user_by_email("alice@example.org")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, alice.id);
}

// ─── Access ─────────────────────────────────────────────────────────

#[tokio::test]
async fn effective_permission_merges_origins_over_sqlite() {
    let env = setup().await;
    let store = env.store.as_ref();
    let owner = user(store, "owner@example.org", Some("Olive")).await;
    let bob = user(store, "bob@example.org", Some("Bob")).await;
    let capture = Capture::new(owner.id, CaptureType::Drf, "ch0", "/run");
    store.insert_capture(&capture).await.unwrap();
    let object = ObjectRef::capture(capture.id);

    let group = sharing::create_share_group(store, owner.id, "lab", &[bob.id])
        .await
        .unwrap();
    sharing::share_with_group(store, owner.id, group.id, object, PermissionLevel::Contributor)
        .await
        .unwrap();
    sharing::share_individual(store, owner.id, bob.id, object, PermissionLevel::Viewer)
        .await
        .unwrap();

    let level = access::effective_permission(store, bob.id, &object).await.unwrap();
    assert_eq!(level, Some(PermissionLevel::Contributor));
    assert_eq!(
        access::effective_permission(store, owner.id, &object).await.unwrap(),
        Some(PermissionLevel::Owner)
    );

    // Revoking the group grant leaves the individual one.
    assert!(sharing::revoke_group(store, group.id, object).await.unwrap() > 0);
    let level = access::effective_permission(store, bob.id, &object).await.unwrap();
    assert_eq!(level, Some(PermissionLevel::Viewer));

    sharing::revoke_individual(store, bob.id, object).await.unwrap();
    assert_eq!(access::effective_permission(store, bob.id, &object).await.unwrap(), None);
}

#[tokio::test]
async fn dataset_authors_follow_shares() {
    let env = setup().await;
    let store = env.store.as_ref();
    let owner = user(store, "owner@example.org", Some("Olive")).await;
    let bob = user(store, "bob@example.org", None).await;
    let dataset = Dataset::new(owner.id, "survey");
    access::save_dataset(store, &dataset).await.unwrap();

    sharing::share_individual(
        store,
        owner.id,
        bob.id,
        ObjectRef::dataset(dataset.id),
        PermissionLevel::CoOwner,
    )
    .await
    .unwrap();

    let drifts = access::audit_authors(store).await.unwrap();
    assert_eq!(drifts.len(), 1);
    assert_eq!(drifts[0].stored, vec!["Olive".to_string()]);

    let sync = access::resync_authors(store, dataset.id).await.unwrap();
    assert!(sync.changed());
    assert_eq!(
        store.get_dataset(dataset.id).await.unwrap().unwrap().authors,
        sync.after
    );
    assert!(access::audit_authors(store).await.unwrap().is_empty());
}
