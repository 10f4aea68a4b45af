//! # Capture Catalog Core
//!
//! Runtime-agnostic logic for the capture catalog: the data model, the
//! per-capture-type schema registry, channel metadata extraction, search
//! index lifecycle, the indexing orchestrator, composite capture identity,
//! and the access overlay resolver.
//!
//! This crate contains no tokio runtime, sqlx, HTTP client, or other
//! native-only dependencies. External collaborators are reached through
//! three seams:
//!
//! | Seam | Purpose | In-memory implementation |
//! |------|---------|--------------------------|
//! | [`store::CatalogStore`] | Relational records (captures, datasets, shares) | [`store::memory::InMemoryStore`] |
//! | [`index::SearchIndex`] | Schema-driven search index | [`index::memory::InMemoryIndex`] |
//! | [`archive::ArchiveReader`] | Per-channel archive reader | [`archive::memory::InMemoryArchive`] |

pub mod access;
pub mod archive;
pub mod composite;
pub mod extract;
pub mod fill;
pub mod index;
pub mod indexing;
pub mod lifecycle;
pub mod models;
pub mod registration;
pub mod schema;
pub mod sharing;
pub mod store;
