//! In-memory [`ArchiveReader`] for tests and embedders.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::{ArchiveError, ArchiveHandle, ArchiveReader};
use crate::fill::{FillPolicy, MetadataSeries};

/// One channel's contents.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChannel {
    /// `None` simulates a channel whose bounds cannot be read.
    pub bounds: Option<(u64, u64)>,
    pub properties: Map<String, Value>,
    /// Simulates a channel whose properties cannot be read.
    pub unreadable_properties: bool,
    pub metadata: MetadataSeries,
}

impl InMemoryChannel {
    pub fn new(start: u64, end: u64, properties: Map<String, Value>) -> Self {
        Self {
            bounds: Some((start, end)),
            properties,
            unreadable_properties: false,
            metadata: MetadataSeries::default(),
        }
    }

    pub fn with_metadata(mut self, records: Vec<(u64, Map<String, Value>)>) -> Self {
        self.metadata = MetadataSeries::from_records(records);
        self
    }
}

/// Archives keyed by path.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArchive {
    archives: HashMap<PathBuf, BTreeMap<String, InMemoryChannel>>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(
        mut self,
        path: impl Into<PathBuf>,
        channel: impl Into<String>,
        data: InMemoryChannel,
    ) -> Self {
        self.archives
            .entry(path.into())
            .or_default()
            .insert(channel.into(), data);
        self
    }
}

struct InMemoryHandle<'a> {
    channels: &'a BTreeMap<String, InMemoryChannel>,
}

impl InMemoryHandle<'_> {
    fn channel(&self, channel: &str) -> Result<&InMemoryChannel, ArchiveError> {
        self.channels
            .get(channel)
            .ok_or_else(|| ArchiveError::UnknownChannel {
                channel: channel.to_string(),
            })
    }
}

impl ArchiveReader for InMemoryArchive {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveHandle + '_>, ArchiveError> {
        let channels = self
            .archives
            .get(path)
            .ok_or_else(|| ArchiveError::NotFound {
                path: path.to_path_buf(),
            })?;
        Ok(Box::new(InMemoryHandle { channels }))
    }
}

impl ArchiveHandle for InMemoryHandle<'_> {
    fn channels(&self) -> Result<Vec<String>, ArchiveError> {
        Ok(self.channels.keys().cloned().collect())
    }

    fn bounds(&self, channel: &str) -> Result<(u64, u64), ArchiveError> {
        self.channel(channel)?
            .bounds
            .ok_or_else(|| ArchiveError::Malformed {
                path: PathBuf::from(channel),
                reason: "no readable sample bounds".to_string(),
            })
    }

    fn properties(&self, channel: &str, _index: u64) -> Result<Map<String, Value>, ArchiveError> {
        let data = self.channel(channel)?;
        if data.unreadable_properties {
            return Err(ArchiveError::Malformed {
                path: PathBuf::from(channel),
                reason: "no readable properties".to_string(),
            });
        }
        Ok(data.properties.clone())
    }

    fn digital_metadata(
        &self,
        channel: &str,
        start_index: u64,
        fill: FillPolicy,
    ) -> Result<Map<String, Value>, ArchiveError> {
        Ok(self.channel(channel)?.metadata.snapshot(start_index, fill))
    }
}
