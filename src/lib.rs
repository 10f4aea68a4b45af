//! # Capture Catalog
//!
//! Indexing and access resolution for an RF capture metadata catalog.
//!
//! Captures are registered in a relational store (SQLite), their metadata
//! is extracted from channel archives or taken from the capture record,
//! validated against a per-type schema, and projected into a per-type
//! search index (`captures-<type>`) whose mapping is kept in sync with the
//! schema. Access to captures and datasets is resolved from individual and
//! group share rows.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Archives   │──▶│   Indexer    │──▶│ Search index │
//! │ (fs sidecar) │   │ extract+val. │   │ captures-*   │
//! └──────────────┘   └──────┬───────┘   └──────────────┘
//!                           │
//!                    ┌──────▼───────┐   ┌──────────────┐
//!                    │    SQLite    │◀──│    Access    │
//!                    │   catalog    │   │   resolver   │
//!                    └──────────────┘   └──────────────┘
//! ```
//!
//! The domain logic lives in `capture-catalog-core`; this crate provides
//! the native implementations of its seams and the `capcat` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! capcat init
//! capcat user add alice@example.org --name "Alice"
//! capcat capture register --owner alice@example.org --type drf --dir /run-42
//! capcat reindex drf
//! capcat access check --user alice@example.org --object capture:<id>
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `CatalogStore` |
//! | [`opensearch`] | HTTP `SearchIndex` client |
//! | [`archive_fs`] | Filesystem `ArchiveReader` |
//! | [`context`] | Wiring of store, index and archive reader |
//! | [`logging`] | Tracing subscriber setup |
//! | [`progress`] | Reindex progress reporting |
//! | [`capture_cmd`], [`dataset_cmd`], [`index_cmd`], [`access_cmd`], [`stats`] | CLI commands |

pub mod access_cmd;
pub mod archive_fs;
pub mod capture_cmd;
pub mod config;
pub mod context;
pub mod dataset_cmd;
pub mod db;
pub mod index_cmd;
pub mod logging;
pub mod migrate;
pub mod opensearch;
pub mod progress;
pub mod sqlite_store;
pub mod stats;
