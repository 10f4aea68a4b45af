//! SQLite-backed [`CatalogStore`] implementation.
//!
//! Identifiers are stored as hyphenated UUID text, timestamps as
//! microseconds since the epoch, and JSON columns (`metadata_json`,
//! `authors_json`) as text. Capture uniqueness is enforced by a partial
//! unique index over live rows (see [`crate::migrate`]).

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use capture_catalog_core::models::{
    Capture, Dataset, ObjectRef, ShareGroup, User, UserSharePermission,
};
use capture_catalog_core::store::{CaptureFilter, CatalogStore, PermissionFilter};

/// SQLite implementation of [`CatalogStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT user_id FROM share_group_members WHERE group_id = ?")
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| parse_uuid(&r.get::<String, _>("user_id")))
            .collect()
    }

    async fn load_group(&self, row: &SqliteRow) -> Result<ShareGroup> {
        let id: String = row.get("id");
        let members = self.group_members(&id).await?;
        Ok(ShareGroup {
            id: parse_uuid(&id)?,
            owner_id: parse_uuid(&row.get::<String, _>("owner_id"))?,
            name: row.get("name"),
            members: members.into_iter().collect(),
            created_at: from_micros(row.get("created_at"))?,
            is_deleted: row.get("is_deleted"),
        })
    }

    async fn group_exists(&self, group_id: Uuid) -> Result<()> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM share_groups WHERE id = ? AND is_deleted = 0",
        )
        .bind(group_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            bail!("share group {} not found", group_id);
        }
        Ok(())
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid UUID in database: '{}'", s))
}

fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
    s.as_deref().map(parse_uuid).transpose()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| anyhow!("Invalid timestamp in database: {}", micros))
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        email: row.get("email"),
        name: row.get("name"),
        is_deleted: row.get("is_deleted"),
    })
}

fn row_to_capture(row: &SqliteRow) -> Result<Capture> {
    let metadata_json: String = row.get("metadata_json");
    let metadata: Map<String, Value> =
        serde_json::from_str(&metadata_json).context("Invalid capture metadata_json")?;
    Ok(Capture {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        owner_id: parse_uuid(&row.get::<String, _>("owner_id"))?,
        capture_type: row.get::<String, _>("capture_type").parse()?,
        channel: row.get("channel"),
        scan_group: parse_opt_uuid(row.get("scan_group"))?,
        top_level_dir: row.get("top_level_dir"),
        is_multi_channel: row.get("is_multi_channel"),
        metadata,
        created_at: from_micros(row.get("created_at"))?,
        updated_at: from_micros(row.get("updated_at"))?,
        is_deleted: row.get("is_deleted"),
    })
}

fn row_to_dataset(row: &SqliteRow) -> Result<Dataset> {
    let authors_json: String = row.get("authors_json");
    Ok(Dataset {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        owner_id: parse_uuid(&row.get::<String, _>("owner_id"))?,
        name: row.get("name"),
        description: row.get("description"),
        status: row.get::<String, _>("status").parse()?,
        authors: serde_json::from_str(&authors_json).context("Invalid dataset authors_json")?,
        created_at: from_micros(row.get("created_at"))?,
        updated_at: from_micros(row.get("updated_at"))?,
        is_deleted: row.get("is_deleted"),
    })
}

fn row_to_permission(row: &SqliteRow) -> Result<UserSharePermission> {
    Ok(UserSharePermission {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        owner_id: parse_uuid(&row.get::<String, _>("owner_id"))?,
        grantee_id: parse_uuid(&row.get::<String, _>("grantee_id"))?,
        object: ObjectRef {
            item_type: row.get::<String, _>("item_type").parse()?,
            item_id: parse_uuid(&row.get::<String, _>("item_id"))?,
        },
        level: row.get::<String, _>("level").parse()?,
        is_individual_share: row.get("is_individual_share"),
        share_group_id: parse_opt_uuid(row.get("share_group_id"))?,
        is_enabled: row.get("is_enabled"),
        is_deleted: row.get("is_deleted"),
        created_at: from_micros(row.get("created_at"))?,
    })
}

/// Soft-delete live share rows matching `filter`.
async fn soft_delete_permissions(conn: &mut SqliteConnection, filter: &PermissionFilter) -> Result<u64> {
    let grantee = filter.grantee_id.map(|g| g.to_string());
    let group = filter.share_group_id.map(|g| g.to_string());
    let result = sqlx::query(
        r#"
        UPDATE user_share_permissions SET is_deleted = 1
        WHERE is_deleted = 0
          AND item_type = ? AND item_id = ?
          AND (? IS NULL OR grantee_id = ?)
          AND (? IS NULL OR share_group_id = ?)
          AND (? IS NULL OR is_individual_share = ?)
        "#,
    )
    .bind(filter.object.item_type.as_str())
    .bind(filter.object.item_id.to_string())
    .bind(&grantee)
    .bind(&grantee)
    .bind(&group)
    .bind(&group)
    .bind(filter.is_individual_share)
    .bind(filter.is_individual_share)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_permission(conn: &mut SqliteConnection, row: &UserSharePermission) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_share_permissions (id, owner_id, grantee_id, item_type, item_id, level,
                                            is_individual_share, share_group_id, is_enabled,
                                            is_deleted, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(row.id.to_string())
    .bind(row.owner_id.to_string())
    .bind(row.grantee_id.to_string())
    .bind(row.object.item_type.as_str())
    .bind(row.object.item_id.to_string())
    .bind(row.level.as_str())
    .bind(row.is_individual_share)
    .bind(row.share_group_id.map(|g| g.to_string()))
    .bind(row.is_enabled)
    .bind(row.is_deleted)
    .bind(row.created_at.timestamp_micros())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn upsert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, is_deleted)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                name = excluded.name,
                is_deleted = excluded.is_deleted
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.is_deleted)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save user {}", user.email))?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ? AND is_deleted = 0")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT * FROM users WHERE email = ? COLLATE NOCASE AND is_deleted = 0",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn insert_capture(&self, capture: &Capture) -> Result<()> {
        let metadata_json = serde_json::to_string(&capture.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO captures (id, owner_id, capture_type, channel, scan_group, top_level_dir,
                                  is_multi_channel, metadata_json, created_at, updated_at, is_deleted)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(capture.id.to_string())
        .bind(capture.owner_id.to_string())
        .bind(capture.capture_type.as_str())
        .bind(&capture.channel)
        .bind(capture.scan_group.map(|g| g.to_string()))
        .bind(&capture.top_level_dir)
        .bind(capture.is_multi_channel)
        .bind(&metadata_json)
        .bind(capture.created_at.timestamp_micros())
        .bind(capture.updated_at.timestamp_micros())
        .bind(capture.is_deleted)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to insert capture for channel '{}' under '{}'",
                capture.channel, capture.top_level_dir
            )
        })?;
        Ok(())
    }

    async fn get_capture(&self, id: Uuid) -> Result<Option<Capture>> {
        let row = sqlx::query("SELECT * FROM captures WHERE id = ? AND is_deleted = 0")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_capture).transpose()
    }

    async fn list_captures(&self, filter: &CaptureFilter) -> Result<Vec<Capture>> {
        let capture_type = filter.capture_type.map(|t| t.as_str());
        let owner = filter.owner_id.map(|o| o.to_string());
        let rows = sqlx::query(
            r#"
            SELECT * FROM captures
            WHERE is_deleted = 0
              AND (? IS NULL OR capture_type = ?)
              AND (? IS NULL OR owner_id = ?)
              AND (? IS NULL OR top_level_dir = ?)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(capture_type)
        .bind(capture_type)
        .bind(&owner)
        .bind(&owner)
        .bind(&filter.top_level_dir)
        .bind(&filter.top_level_dir)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_capture).collect()
    }

    async fn update_capture_metadata(&self, id: Uuid, metadata: &Map<String, Value>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE captures SET metadata_json = ?, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(serde_json::to_string(metadata)?)
        .bind(Utc::now().timestamp_micros())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            bail!("capture {} not found", id);
        }
        Ok(())
    }

    async fn soft_delete_capture(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE captures SET is_deleted = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp_micros())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_dataset(&self, dataset: &Dataset) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO datasets (id, owner_id, name, description, status, authors_json,
                                  created_at, updated_at, is_deleted)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                status = excluded.status,
                authors_json = excluded.authors_json,
                updated_at = excluded.updated_at,
                is_deleted = excluded.is_deleted
            "#,
        )
        .bind(dataset.id.to_string())
        .bind(dataset.owner_id.to_string())
        .bind(&dataset.name)
        .bind(&dataset.description)
        .bind(dataset.status.as_str())
        .bind(serde_json::to_string(&dataset.authors)?)
        .bind(dataset.created_at.timestamp_micros())
        .bind(dataset.updated_at.timestamp_micros())
        .bind(dataset.is_deleted)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_dataset(&self, id: Uuid) -> Result<Option<Dataset>> {
        let row = sqlx::query("SELECT * FROM datasets WHERE id = ? AND is_deleted = 0")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_dataset).transpose()
    }

    async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        let rows = sqlx::query(
            "SELECT * FROM datasets WHERE is_deleted = 0 ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_dataset).collect()
    }

    async fn link_dataset_capture(&self, dataset_id: Uuid, capture_id: Uuid) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO dataset_captures (dataset_id, capture_id) VALUES (?, ?)")
            .bind(dataset_id.to_string())
            .bind(capture_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn dataset_capture_ids(&self, dataset_id: Uuid) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT dc.capture_id FROM dataset_captures dc
            JOIN captures c ON c.id = dc.capture_id
            WHERE dc.dataset_id = ? AND c.is_deleted = 0
            ORDER BY c.created_at ASC, c.id ASC
            "#,
        )
        .bind(dataset_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| parse_uuid(&r.get::<String, _>("capture_id")))
            .collect()
    }

    async fn set_dataset_authors(&self, dataset_id: Uuid, authors: &[String]) -> Result<()> {
        let result =
            sqlx::query("UPDATE datasets SET authors_json = ?, updated_at = ? WHERE id = ?")
                .bind(serde_json::to_string(authors)?)
                .bind(Utc::now().timestamp_micros())
                .bind(dataset_id.to_string())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            bail!("dataset {} not found", dataset_id);
        }
        Ok(())
    }

    async fn create_share_group(&self, group: &ShareGroup) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let id = group.id.to_string();

        sqlx::query(
            "INSERT INTO share_groups (id, owner_id, name, created_at, is_deleted) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(group.owner_id.to_string())
        .bind(&group.name)
        .bind(group.created_at.timestamp_micros())
        .bind(group.is_deleted)
        .execute(&mut *tx)
        .await?;

        for member in group.effective_members() {
            sqlx::query("INSERT OR IGNORE INTO share_group_members (group_id, user_id) VALUES (?, ?)")
                .bind(&id)
                .bind(member.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_share_group(&self, id: Uuid) -> Result<Option<ShareGroup>> {
        let row = sqlx::query("SELECT * FROM share_groups WHERE id = ? AND is_deleted = 0")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.load_group(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list_share_groups(&self) -> Result<Vec<ShareGroup>> {
        let rows = sqlx::query(
            "SELECT * FROM share_groups WHERE is_deleted = 0 ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut groups = Vec::with_capacity(rows.len());
        for row in &rows {
            groups.push(self.load_group(row).await?);
        }
        Ok(groups)
    }

    async fn groups_for_user(&self, user_id: Uuid) -> Result<Vec<ShareGroup>> {
        let user = user_id.to_string();
        let rows = sqlx::query(
            r#"
            SELECT g.* FROM share_groups g
            WHERE g.is_deleted = 0
              AND (g.owner_id = ?
                   OR EXISTS (SELECT 1 FROM share_group_members m
                              WHERE m.group_id = g.id AND m.user_id = ?))
            ORDER BY g.created_at ASC, g.id ASC
            "#,
        )
        .bind(&user)
        .bind(&user)
        .fetch_all(&self.pool)
        .await?;
        let mut groups = Vec::with_capacity(rows.len());
        for row in &rows {
            groups.push(self.load_group(row).await?);
        }
        Ok(groups)
    }

    async fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.group_exists(group_id).await?;
        let result =
            sqlx::query("INSERT OR IGNORE INTO share_group_members (group_id, user_id) VALUES (?, ?)")
                .bind(group_id.to_string())
                .bind(user_id.to_string())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.group_exists(group_id).await?;
        let result = sqlx::query("DELETE FROM share_group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn permissions_for_object(&self, object: &ObjectRef) -> Result<Vec<UserSharePermission>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM user_share_permissions
            WHERE item_type = ? AND item_id = ? AND is_deleted = 0
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(object.item_type.as_str())
        .bind(object.item_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_permission).collect()
    }

    async fn replace_permissions(
        &self,
        filter: &PermissionFilter,
        rows: &[UserSharePermission],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        soft_delete_permissions(&mut tx, filter).await?;
        for row in rows {
            insert_permission(&mut tx, row).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn revoke_permissions(&self, filter: &PermissionFilter) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        soft_delete_permissions(&mut conn, filter).await
    }
}
