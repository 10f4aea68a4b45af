//! `capcat dataset create|add`.
//!
//! Both commands go through [`save_dataset`] / [`resync_authors`] so the
//! stored author list is recomputed on every write.

use anyhow::{Context, Result};
use uuid::Uuid;

use capture_catalog_core::access::{resync_authors, save_dataset};
use capture_catalog_core::models::Dataset;
use capture_catalog_core::store::CatalogStore;

use crate::access_cmd::resolve_user;
use crate::config::Config;
use crate::context;

pub async fn run_create(
    config: &Config,
    owner: &str,
    name: &str,
    description: Option<String>,
) -> Result<()> {
    let store = context::store_only(config).await?;
    let owner = resolve_user(&store, owner).await?;
    let mut dataset = Dataset::new(owner.id, name);
    dataset.description = description;
    let sync = save_dataset(&store, &dataset).await;
    store.pool().close().await;
    let sync = sync?;
    println!("{}", dataset.id);
    println!("authors: {}", sync.after.join(", "));
    Ok(())
}

pub async fn run_add_capture(config: &Config, dataset: &str, capture: &str) -> Result<()> {
    let dataset_id =
        Uuid::parse_str(dataset).with_context(|| format!("Invalid dataset id: '{}'", dataset))?;
    let capture_id =
        Uuid::parse_str(capture).with_context(|| format!("Invalid capture id: '{}'", capture))?;
    let store = context::store_only(config).await?;
    let result = async {
        store
            .get_dataset(dataset_id)
            .await?
            .with_context(|| format!("dataset {} not found", dataset_id))?;
        store
            .get_capture(capture_id)
            .await?
            .with_context(|| format!("capture {} not found", capture_id))?;
        store.link_dataset_capture(dataset_id, capture_id).await?;
        resync_authors(&store, dataset_id).await
    }
    .await;
    store.pool().close().await;
    let sync = result?;
    println!("linked {} to {}", capture_id, dataset_id);
    if sync.changed() {
        println!("authors: {}", sync.after.join(", "));
    }
    Ok(())
}
