//! Capture commands: `capcat capture register|list` and `capcat ingest`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use uuid::Uuid;

use capture_catalog_core::composite::{composite_groups, deduplicate};
use capture_catalog_core::indexing::IngestOptions;
use capture_catalog_core::models::{checked_top_level_dir, Capture, CaptureType};
use capture_catalog_core::registration::{register_archive, register_capture};
use capture_catalog_core::store::{CaptureFilter, CatalogStore};

use crate::access_cmd::resolve_user;
use crate::archive_fs::FsArchiveReader;
use crate::config::Config;
use crate::context::{self, Catalog};

/// Arguments for `capcat capture register`.
pub struct RegisterArgs {
    pub owner: String,
    pub capture_type: CaptureType,
    pub dir: String,
    /// Single channel for captures whose metadata is supplied directly.
    pub channel: Option<String>,
    /// JSON file holding the metadata object.
    pub metadata: Option<PathBuf>,
}

pub async fn run_register(config: &Config, args: RegisterArgs) -> Result<()> {
    let store = context::store_only(config).await?;
    let owner = resolve_user(&store, &args.owner).await?;

    let captures = if args.capture_type.is_archive_backed() {
        if args.channel.is_some() || args.metadata.is_some() {
            bail!(
                "{} captures read channels and metadata from the archive; drop --channel/--metadata",
                args.capture_type
            );
        }
        let dir = checked_top_level_dir(&args.dir)?;
        let archive_path = config.archive.root.join(dir.trim_start_matches('/'));
        register_archive(
            &store,
            &FsArchiveReader::new(),
            owner.id,
            args.capture_type,
            &archive_path,
            &dir,
        )
        .await?
    } else {
        let channel = args
            .channel
            .as_deref()
            .with_context(|| format!("{} captures require --channel", args.capture_type))?;
        let metadata = match &args.metadata {
            Some(path) => read_metadata(path)?,
            None => Map::new(),
        };
        vec![register_capture(&store, owner.id, args.capture_type, channel, &args.dir, metadata).await?]
    };

    for capture in &captures {
        println!(
            "registered {}  {}  {}  channel={}",
            capture.id, capture.capture_type, capture.top_level_dir, capture.channel
        );
    }
    store.pool().close().await;
    Ok(())
}

fn read_metadata(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read metadata file: {}", path.display()))?;
    match serde_json::from_str::<Value>(&content)
        .with_context(|| format!("Failed to parse metadata file: {}", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => bail!("Metadata file {} must hold a JSON object", path.display()),
    }
}

/// Arguments for `capcat capture list`.
pub struct ListArgs {
    pub capture_type: Option<CaptureType>,
    pub owner: Option<String>,
    pub dedup: bool,
    pub groups: bool,
    pub json: bool,
}

pub async fn run_list(config: &Config, args: ListArgs) -> Result<()> {
    let store = context::store_only(config).await?;
    let owner_id = match &args.owner {
        Some(owner) => Some(resolve_user(&store, owner).await?.id),
        None => None,
    };
    let filter = CaptureFilter {
        capture_type: args.capture_type,
        owner_id,
        top_level_dir: None,
    };
    let captures = store.list_captures(&filter).await?;
    store.pool().close().await;

    if args.groups {
        let groups = composite_groups(&captures);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&groups)?);
            return Ok(());
        }
        for group in &groups {
            println!(
                "{}  base={}  channels={}",
                group.top_level_dir,
                group.base.id,
                group.channels().join(",")
            );
        }
        return Ok(());
    }

    let captures = if args.dedup {
        deduplicate(&captures)
    } else {
        captures
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&captures)?);
        return Ok(());
    }

    if captures.is_empty() {
        println!("No captures.");
        return Ok(());
    }
    println!(
        "{:<36}  {:<5}  {:<8}  {:<5}  DIR",
        "ID", "TYPE", "CHANNEL", "MULTI"
    );
    for capture in &captures {
        print_capture_row(capture);
    }
    Ok(())
}

fn print_capture_row(capture: &Capture) {
    println!(
        "{:<36}  {:<5}  {:<8}  {:<5}  {}",
        capture.id,
        capture.capture_type.as_str(),
        capture.channel,
        if capture.is_multi_channel { "yes" } else { "no" },
        capture.top_level_dir
    );
}

/// `capcat ingest <capture-id>`.
pub async fn run_ingest(config: &Config, capture_id: &str, options: IngestOptions) -> Result<()> {
    let capture_id = Uuid::parse_str(capture_id)
        .with_context(|| format!("Invalid capture id: '{}'", capture_id))?;
    let catalog = Catalog::open(config).await?;
    let result = catalog.indexer.ingest_by_id(capture_id, options).await;
    catalog.close().await;
    let outcome = result?;

    if let Some(ensure) = &outcome.ensure {
        if ensure.created {
            println!("created index {}", ensure.index);
        }
        for rejected in &ensure.rejected {
            println!(
                "warning: mapping for '{}' kept as {} ({})",
                rejected.field,
                rejected
                    .current
                    .map(|t| t.as_str())
                    .unwrap_or("unmapped"),
                rejected.reason
            );
        }
    }
    for warning in &outcome.warnings {
        println!("warning: {}", warning);
    }
    println!("indexed {} into {}", outcome.capture_id, outcome.index);
    Ok(())
}
