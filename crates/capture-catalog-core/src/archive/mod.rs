//! Channel archive reader abstraction.
//!
//! The archive reader is an external collaborator. [`ArchiveReader::open`]
//! returns a short-lived [`ArchiveHandle`] scoped to one extraction call;
//! nothing here is a process-wide singleton, so tests and concurrent callers
//! can each hold their own reader.

pub mod memory;

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::fill::FillPolicy;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("archive I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed archive at {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("channel '{channel}' not present in archive")]
    UnknownChannel { channel: String },
}

/// Opens channel archives.
pub trait ArchiveReader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveHandle + '_>, ArchiveError>;
}

/// An open archive.
pub trait ArchiveHandle: Send {
    /// Channel names present in the archive, sorted.
    fn channels(&self) -> Result<Vec<String>, ArchiveError>;

    /// Inclusive `(start, end)` sample indices for `channel`.
    fn bounds(&self, channel: &str) -> Result<(u64, u64), ArchiveError>;

    /// Channel properties in effect at sample `index`.
    fn properties(&self, channel: &str, index: u64) -> Result<Map<String, Value>, ArchiveError>;

    /// Auxiliary metadata at `start_index` resolved with `fill`.
    fn digital_metadata(
        &self,
        channel: &str,
        start_index: u64,
        fill: FillPolicy,
    ) -> Result<Map<String, Value>, ArchiveError>;
}
