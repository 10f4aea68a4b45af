//! Filesystem [`ArchiveReader`] over JSON channel sidecars.
//!
//! An archive is a directory with one subdirectory per channel:
//!
//! ```text
//! <archive>/
//!   ch0/
//!     properties.json   {"start_index": 1000000, "end_index": 1150000, "properties": {...}}
//!     metadata.json     [{"index": 0, "values": {...}}, ...]   (optional)
//!   ch1/
//!     properties.json
//! ```
//!
//! `metadata.json` records are forward-filled: a value recorded at an
//! earlier sample index holds until a later record supersedes it.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use capture_catalog_core::archive::{ArchiveError, ArchiveHandle, ArchiveReader};
use capture_catalog_core::fill::{FillPolicy, MetadataSeries};

const PROPERTIES_FILE: &str = "properties.json";
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Deserialize)]
struct ChannelProperties {
    start_index: u64,
    end_index: u64,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct MetadataRecord {
    index: u64,
    #[serde(default)]
    values: Map<String, Value>,
}

/// Reads archives from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsArchiveReader;

impl FsArchiveReader {
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveReader for FsArchiveReader {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveHandle + '_>, ArchiveError> {
        if !path.is_dir() {
            return Err(ArchiveError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(Box::new(FsArchiveHandle {
            root: path.to_path_buf(),
        }))
    }
}

struct FsArchiveHandle {
    root: PathBuf,
}

impl FsArchiveHandle {
    fn channel_dir(&self, channel: &str) -> Result<PathBuf, ArchiveError> {
        let dir = self.root.join(channel);
        if channel.contains('/') || channel.contains("..") || !dir.join(PROPERTIES_FILE).is_file() {
            return Err(ArchiveError::UnknownChannel {
                channel: channel.to_string(),
            });
        }
        Ok(dir)
    }

    fn read_properties(&self, channel: &str) -> Result<ChannelProperties, ArchiveError> {
        let path = self.channel_dir(channel)?.join(PROPERTIES_FILE);
        let props: ChannelProperties = read_json(&path)?;
        if props.end_index < props.start_index {
            return Err(ArchiveError::Malformed {
                path,
                reason: format!(
                    "end_index {} precedes start_index {}",
                    props.end_index, props.start_index
                ),
            });
        }
        Ok(props)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArchiveError> {
    let content = std::fs::read_to_string(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|e| ArchiveError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

impl ArchiveHandle for FsArchiveHandle {
    fn channels(&self) -> Result<Vec<String>, ArchiveError> {
        let mut channels = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| ArchiveError::Io {
                path: self.root.clone(),
                source: e.into(),
            })?;
            if entry.file_type().is_dir() && entry.path().join(PROPERTIES_FILE).is_file() {
                channels.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        channels.sort();
        Ok(channels)
    }

    fn bounds(&self, channel: &str) -> Result<(u64, u64), ArchiveError> {
        let props = self.read_properties(channel)?;
        Ok((props.start_index, props.end_index))
    }

    fn properties(&self, channel: &str, _index: u64) -> Result<Map<String, Value>, ArchiveError> {
        Ok(self.read_properties(channel)?.properties)
    }

    fn digital_metadata(
        &self,
        channel: &str,
        start_index: u64,
        fill: FillPolicy,
    ) -> Result<Map<String, Value>, ArchiveError> {
        let path = self.channel_dir(channel)?.join(METADATA_FILE);
        if !path.is_file() {
            return Ok(Map::new());
        }
        let records: Vec<MetadataRecord> = read_json(&path)?;
        let series = MetadataSeries::from_records(records.into_iter().map(|r| (r.index, r.values)));
        Ok(series.snapshot(start_index, fill))
    }
}
