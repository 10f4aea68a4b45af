//! Capture registration.
//!
//! An archive with several channels becomes one capture per channel, all
//! flagged multi-channel and sharing a scan group. Registration never
//! indexes; callers ingest afterwards.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::archive::ArchiveReader;
use crate::models::{checked_top_level_dir, Capture, CaptureType};
use crate::store::{CaptureFilter, CatalogStore};

fn archive_channels(reader: &dyn ArchiveReader, path: &Path) -> Result<Vec<String>> {
    let handle = reader
        .open(path)
        .with_context(|| format!("Failed to open archive {}", path.display()))?;
    let mut channels = handle
        .channels()
        .with_context(|| format!("Failed to list channels in {}", path.display()))?;
    channels.sort();
    channels.dedup();
    Ok(channels)
}

async fn check_unregistered<S: CatalogStore + ?Sized>(
    store: &S,
    owner: Uuid,
    top_level_dir: &str,
    channels: &[String],
) -> Result<()> {
    let filter = CaptureFilter {
        owner_id: Some(owner),
        top_level_dir: Some(top_level_dir.to_string()),
        ..Default::default()
    };
    let taken: Vec<String> = store
        .list_captures(&filter)
        .await?
        .into_iter()
        .filter(|c| channels.contains(&c.channel))
        .map(|c| c.channel)
        .collect();
    if !taken.is_empty() {
        bail!(
            "Channel(s) {} already registered under '{}'",
            taken.join(", "),
            top_level_dir
        );
    }
    Ok(())
}

/// Register every channel of the archive at `archive_path` as a capture
/// under `top_level_dir`.
pub async fn register_archive<S: CatalogStore + ?Sized>(
    store: &S,
    reader: &dyn ArchiveReader,
    owner: Uuid,
    capture_type: CaptureType,
    archive_path: &Path,
    top_level_dir: &str,
) -> Result<Vec<Capture>> {
    let top_level_dir = checked_top_level_dir(top_level_dir)?;
    let channels = archive_channels(reader, archive_path)?;
    if channels.is_empty() {
        bail!("Archive {} contains no channels", archive_path.display());
    }

    check_unregistered(store, owner, &top_level_dir, &channels).await?;

    let multi = channels.len() > 1;
    let scan_group = Uuid::new_v4();
    let mut captures = Vec::with_capacity(channels.len());
    for channel in &channels {
        let mut capture = Capture::new(owner, capture_type, channel.as_str(), top_level_dir.as_str());
        capture.is_multi_channel = multi;
        capture.scan_group = Some(scan_group);
        store.insert_capture(&capture).await?;
        captures.push(capture);
    }

    tracing::info!(
        dir = %top_level_dir,
        channels = captures.len(),
        multi_channel = multi,
        "archive registered"
    );
    Ok(captures)
}

/// Register a single capture whose metadata is supplied directly.
pub async fn register_capture<S: CatalogStore + ?Sized>(
    store: &S,
    owner: Uuid,
    capture_type: CaptureType,
    channel: &str,
    top_level_dir: &str,
    metadata: Map<String, Value>,
) -> Result<Capture> {
    let top_level_dir = checked_top_level_dir(top_level_dir)?;
    let mut capture = Capture::new(owner, capture_type, channel, top_level_dir);
    capture.metadata = metadata;
    check_unregistered(store, owner, &capture.top_level_dir, &[capture.channel.clone()]).await?;
    store.insert_capture(&capture).await?;
    Ok(capture)
}
