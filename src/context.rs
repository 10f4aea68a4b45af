//! Wiring of the native implementations behind the core seams.
//!
//! [`Catalog::open`] connects the SQLite store, the HTTP search index and
//! the filesystem archive reader, and hands them to an [`Indexer`].
//! Commands that never touch the search index use [`Catalog::store_only`]
//! so they work without a reachable index service.

use std::sync::Arc;

use anyhow::Result;

use capture_catalog_core::indexing::Indexer;
use capture_catalog_core::store::CatalogStore;

use crate::archive_fs::FsArchiveReader;
use crate::config::Config;
use crate::db;
use crate::opensearch::OpenSearchIndex;
use crate::sqlite_store::SqliteStore;

pub struct Catalog {
    pub store: Arc<SqliteStore>,
    pub indexer: Indexer,
}

impl Catalog {
    pub async fn open(config: &Config) -> Result<Self> {
        let store = Arc::new(store_only(config).await?);
        let index = Arc::new(OpenSearchIndex::new(&config.index)?);
        let indexer = Indexer::new(
            store.clone() as Arc<dyn CatalogStore>,
            index,
            Arc::new(FsArchiveReader::new()),
        )
        .with_settings(config.index.settings())
        .with_archive_root(&config.archive.root)
        .with_concurrency(config.reindex.concurrency);
        Ok(Self { store, indexer })
    }

    pub async fn close(self) {
        self.store.pool().close().await;
    }
}

/// Open the relational store alone.
pub async fn store_only(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    Ok(SqliteStore::new(pool))
}
