use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub reindex: ReindexConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Search-index service connection.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Name of the environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default = "default_shards")]
    pub shards: u32,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ask the service to refresh after each upsert.
    #[serde(default)]
    pub refresh: bool,
}

fn default_shards() -> u32 {
    1
}
fn default_replicas() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    30
}

impl IndexConfig {
    pub fn settings(&self) -> capture_catalog_core::index::IndexSettings {
        capture_catalog_core::index::IndexSettings {
            shards: self.shards,
            replicas: self.replicas,
        }
    }

    /// Resolve the password from the configured environment variable.
    pub fn password(&self) -> Result<Option<String>> {
        match &self.password_env {
            Some(var) => std::env::var(var)
                .map(Some)
                .with_context(|| format!("index.password_env: environment variable '{}' is not set", var)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    /// Directory that capture `top_level_dir`s are resolved against.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReindexConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: default_format(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}
fn default_format() -> String {
    "text".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate index
    if config.index.shards < 1 {
        anyhow::bail!("index.shards must be >= 1");
    }

    if config.index.timeout_secs < 1 {
        anyhow::bail!("index.timeout_secs must be >= 1");
    }

    if !(config.index.url.starts_with("http://") || config.index.url.starts_with("https://")) {
        anyhow::bail!(
            "index.url must start with http:// or https:// (got '{}')",
            config.index.url
        );
    }

    // Validate reindex
    if config.reindex.concurrency < 1 {
        anyhow::bail!("reindex.concurrency must be >= 1");
    }

    match config.logging.format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("Unknown logging format: '{}'. Must be text or json.", other),
    }

    Ok(config)
}
