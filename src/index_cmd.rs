//! Index maintenance: `capcat index ensure|inspect|reset` and `capcat reindex`.

use anyhow::{bail, Result};

use capture_catalog_core::indexing::{IngestOptions, ReindexReport};
use capture_catalog_core::lifecycle::EnsureReport;
use capture_catalog_core::models::CaptureType;

use crate::config::Config;
use crate::context::Catalog;
use crate::progress::{ProgressMode, ReindexEvent};

pub async fn run_ensure(config: &Config, capture_type: CaptureType) -> Result<()> {
    let catalog = Catalog::open(config).await?;
    let result = catalog.indexer.ensure_index(capture_type).await;
    catalog.close().await;
    print_ensure(&result?);
    Ok(())
}

fn print_ensure(report: &EnsureReport) {
    if report.is_noop() {
        println!("{}: mapping up to date", report.index);
    }
    if report.created {
        println!("{}: created", report.index);
    }
    for field in &report.added {
        println!("{}: added field '{}'", report.index, field);
    }
    for field in &report.updated {
        println!("{}: updated field '{}'", report.index, field);
    }
    for rejected in &report.rejected {
        println!(
            "{}: rejected change of '{}' to {} ({})",
            report.index, rejected.field, rejected.target, rejected.reason
        );
    }
    for field in &report.skipped {
        println!("{}: kept '{}' (change refused earlier)", report.index, field);
    }
}

pub async fn run_inspect(config: &Config, capture_type: CaptureType, json: bool) -> Result<()> {
    let catalog = Catalog::open(config).await?;
    let result = catalog.indexer.inspect_index(capture_type).await;
    catalog.close().await;
    let inspection = result?;

    if json {
        let changed: serde_json::Map<String, serde_json::Value> = inspection
            .diff
            .changed
            .iter()
            .map(|(field, (current, target))| {
                (
                    field.clone(),
                    serde_json::json!({ "current": current.as_str(), "target": target.as_str() }),
                )
            })
            .collect();
        let out = serde_json::json!({
            "index": inspection.index,
            "exists": inspection.exists,
            "documents": inspection.documents,
            "missing": inspection.diff.added.keys().collect::<Vec<_>>(),
            "changed": changed,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Index:      {}", inspection.index);
    if !inspection.exists {
        println!("Status:     missing");
        return Ok(());
    }
    println!("Documents:  {}", inspection.documents);
    println!("Fields:     {} / {}", inspection.current.len(), inspection.target.len());
    if inspection.diff.is_empty() {
        println!("Mapping:    in sync");
        return Ok(());
    }
    for (field, ty) in &inspection.diff.added {
        println!("  missing   {:<28} {}", field, ty);
    }
    for (field, (current, target)) in &inspection.diff.changed {
        println!("  differs   {:<28} {} -> {}", field, current, target);
    }
    Ok(())
}

pub async fn run_reindex(
    config: &Config,
    capture_type: CaptureType,
    options: IngestOptions,
    mode: ProgressMode,
    json: bool,
) -> Result<()> {
    let catalog = Catalog::open(config).await?;
    let reporter = mode.reporter();
    reporter.report(ReindexEvent::Preparing { capture_type });
    let result = catalog
        .indexer
        .reindex_all(capture_type, options, &|p| {
            reporter.report(ReindexEvent::from_progress(capture_type, p))
        })
        .await;
    catalog.close().await;
    print_report(&result?, json)
}

/// Drop and rebuild an index. Destructive, so `--yes` is required.
pub async fn run_reset(
    config: &Config,
    capture_type: CaptureType,
    yes: bool,
    mode: ProgressMode,
    json: bool,
) -> Result<()> {
    if !yes {
        bail!(
            "Refusing to reset {} without --yes: every document in it will be deleted and rebuilt",
            capture_type.index_name()
        );
    }
    let catalog = Catalog::open(config).await?;
    let reporter = mode.reporter();
    reporter.report(ReindexEvent::Preparing { capture_type });
    let result = catalog
        .indexer
        .reset_index(capture_type, IngestOptions::default(), &|p| {
            reporter.report(ReindexEvent::from_progress(capture_type, p))
        })
        .await;
    catalog.close().await;
    print_report(&result?, json)
}

fn print_report(report: &ReindexReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    print_ensure(&report.ensure);
    println!(
        "reindex {}: {} / {} indexed, {} failed",
        report.capture_type,
        report.indexed,
        report.total,
        report.failed.len()
    );
    for item in &report.failed {
        println!("  {}  {}", item.capture_id, item.reason);
    }
    Ok(())
}
