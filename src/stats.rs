//! Catalog statistics.
//!
//! Quick summary of what the relational catalog holds: captures per type
//! (with the deduplicated composite view), datasets, share groups and
//! active share rows. Used by `capcat stats`.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

struct TypeStats {
    capture_type: String,
    captures: i64,
    multi_channel: i64,
    composite_dirs: i64,
}

impl TypeStats {
    /// Count after collapsing each composite group to one entry.
    fn deduplicated(&self) -> i64 {
        self.captures - self.multi_channel + self.composite_dirs
    }
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_deleted = 0")
        .fetch_one(&pool)
        .await?;
    let datasets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM datasets WHERE is_deleted = 0")
        .fetch_one(&pool)
        .await?;
    let groups: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM share_groups WHERE is_deleted = 0")
        .fetch_one(&pool)
        .await?;
    let shares: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_share_permissions WHERE is_deleted = 0 AND is_enabled = 1",
    )
    .fetch_one(&pool)
    .await?;

    let rows = sqlx::query(
        r#"
        SELECT
            capture_type,
            COUNT(*) AS captures,
            SUM(is_multi_channel) AS multi_channel,
            COUNT(DISTINCT CASE WHEN is_multi_channel = 1 THEN top_level_dir END) AS composite_dirs
        FROM captures
        WHERE is_deleted = 0
        GROUP BY capture_type
        ORDER BY capture_type
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let types: Vec<TypeStats> = rows
        .iter()
        .map(|row| TypeStats {
            capture_type: row.get("capture_type"),
            captures: row.get("captures"),
            multi_channel: row.get::<Option<i64>, _>("multi_channel").unwrap_or(0),
            composite_dirs: row.get("composite_dirs"),
        })
        .collect();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Capture Catalog Stats");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Users:       {}", users);
    println!("  Datasets:    {}", datasets);
    println!("  Groups:      {}", groups);
    println!("  Shares:      {}", shares);

    if !types.is_empty() {
        println!();
        println!("  By capture type:");
        println!(
            "  {:<8} {:>9} {:>8} {:>8}",
            "TYPE", "CAPTURES", "MULTI", "DEDUP"
        );
        println!("  {}", "-".repeat(36));
        for t in &types {
            println!(
                "  {:<8} {:>9} {:>8} {:>8}",
                t.capture_type,
                t.captures,
                t.multi_channel,
                t.deduplicated()
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
