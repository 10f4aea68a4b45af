//! In-memory [`CatalogStore`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind one `std::sync::RwLock`, so every
//! mutation is atomic with respect to readers.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{CaptureFilter, CatalogStore, PermissionFilter};
use crate::models::{Capture, Dataset, ObjectRef, ShareGroup, User, UserSharePermission};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    captures: HashMap<Uuid, Capture>,
    datasets: HashMap<Uuid, Dataset>,
    dataset_captures: Vec<(Uuid, Uuid)>,
    groups: HashMap<Uuid, ShareGroup>,
    permissions: Vec<UserSharePermission>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    /// Every stored share row, including soft-deleted ones.
    pub fn all_permissions(&self) -> Result<Vec<UserSharePermission>> {
        Ok(self.read()?.permissions.clone())
    }
}

fn sorted_by_created<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (chrono::DateTime<Utc>, Uuid),
{
    items.sort_by_key(|i| key(i));
    items
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.write()?.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.read()?.users.get(&id).filter(|u| !u.is_deleted).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| !u.is_deleted && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_capture(&self, capture: &Capture) -> Result<()> {
        let mut tables = self.write()?;
        let clash = tables.captures.values().any(|c| {
            !c.is_deleted
                && c.owner_id == capture.owner_id
                && c.top_level_dir == capture.top_level_dir
                && c.channel == capture.channel
        });
        if clash {
            bail!(
                "capture already registered for channel '{}' under '{}'",
                capture.channel,
                capture.top_level_dir
            );
        }
        tables.captures.insert(capture.id, capture.clone());
        Ok(())
    }

    async fn get_capture(&self, id: Uuid) -> Result<Option<Capture>> {
        Ok(self.read()?.captures.get(&id).filter(|c| !c.is_deleted).cloned())
    }

    async fn list_captures(&self, filter: &CaptureFilter) -> Result<Vec<Capture>> {
        let tables = self.read()?;
        let items = tables
            .captures
            .values()
            .filter(|c| !c.is_deleted && filter.matches(c))
            .cloned()
            .collect();
        Ok(sorted_by_created(items, |c: &Capture| (c.created_at, c.id)))
    }

    async fn update_capture_metadata(&self, id: Uuid, metadata: &Map<String, Value>) -> Result<()> {
        let mut tables = self.write()?;
        let capture = tables
            .captures
            .get_mut(&id)
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| anyhow!("capture {} not found", id))?;
        capture.metadata = metadata.clone();
        capture.updated_at = Utc::now();
        Ok(())
    }

    async fn soft_delete_capture(&self, id: Uuid) -> Result<()> {
        if let Some(c) = self.write()?.captures.get_mut(&id) {
            c.is_deleted = true;
            c.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn upsert_dataset(&self, dataset: &Dataset) -> Result<()> {
        self.write()?.datasets.insert(dataset.id, dataset.clone());
        Ok(())
    }

    async fn get_dataset(&self, id: Uuid) -> Result<Option<Dataset>> {
        Ok(self.read()?.datasets.get(&id).filter(|d| !d.is_deleted).cloned())
    }

    async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        let tables = self.read()?;
        let items = tables
            .datasets
            .values()
            .filter(|d| !d.is_deleted)
            .cloned()
            .collect();
        Ok(sorted_by_created(items, |d: &Dataset| (d.created_at, d.id)))
    }

    async fn link_dataset_capture(&self, dataset_id: Uuid, capture_id: Uuid) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.dataset_captures.contains(&(dataset_id, capture_id)) {
            tables.dataset_captures.push((dataset_id, capture_id));
        }
        Ok(())
    }

    async fn dataset_capture_ids(&self, dataset_id: Uuid) -> Result<Vec<Uuid>> {
        let tables = self.read()?;
        Ok(tables
            .dataset_captures
            .iter()
            .filter(|(d, c)| {
                *d == dataset_id && tables.captures.get(c).is_some_and(|c| !c.is_deleted)
            })
            .map(|(_, c)| *c)
            .collect())
    }

    async fn set_dataset_authors(&self, dataset_id: Uuid, authors: &[String]) -> Result<()> {
        let mut tables = self.write()?;
        let dataset = tables
            .datasets
            .get_mut(&dataset_id)
            .ok_or_else(|| anyhow!("dataset {} not found", dataset_id))?;
        dataset.authors = authors.to_vec();
        dataset.updated_at = Utc::now();
        Ok(())
    }

    async fn create_share_group(&self, group: &ShareGroup) -> Result<()> {
        let mut group = group.clone();
        group.members.insert(group.owner_id);
        self.write()?.groups.insert(group.id, group);
        Ok(())
    }

    async fn get_share_group(&self, id: Uuid) -> Result<Option<ShareGroup>> {
        Ok(self.read()?.groups.get(&id).filter(|g| !g.is_deleted).cloned())
    }

    async fn list_share_groups(&self) -> Result<Vec<ShareGroup>> {
        let tables = self.read()?;
        let items = tables
            .groups
            .values()
            .filter(|g| !g.is_deleted)
            .cloned()
            .collect();
        Ok(sorted_by_created(items, |g: &ShareGroup| (g.created_at, g.id)))
    }

    async fn groups_for_user(&self, user_id: Uuid) -> Result<Vec<ShareGroup>> {
        let tables = self.read()?;
        Ok(tables
            .groups
            .values()
            .filter(|g| !g.is_deleted && g.contains(user_id))
            .cloned()
            .collect())
    }

    async fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut tables = self.write()?;
        let group = tables
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| anyhow!("share group {} not found", group_id))?;
        Ok(group.members.insert(user_id))
    }

    async fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut tables = self.write()?;
        let group = tables
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| anyhow!("share group {} not found", group_id))?;
        Ok(group.members.remove(&user_id))
    }

    async fn permissions_for_object(&self, object: &ObjectRef) -> Result<Vec<UserSharePermission>> {
        Ok(self
            .read()?
            .permissions
            .iter()
            .filter(|p| !p.is_deleted && p.object == *object)
            .cloned()
            .collect())
    }

    async fn replace_permissions(
        &self,
        filter: &PermissionFilter,
        rows: &[UserSharePermission],
    ) -> Result<()> {
        let mut tables = self.write()?;
        let existing: BTreeSet<Uuid> = tables.permissions.iter().map(|p| p.id).collect();
        for row in rows {
            if existing.contains(&row.id) {
                bail!("share permission {} already exists", row.id);
            }
        }
        for p in tables.permissions.iter_mut() {
            if !p.is_deleted && filter.matches(p) {
                p.is_deleted = true;
            }
        }
        tables.permissions.extend(rows.iter().cloned());
        Ok(())
    }

    async fn revoke_permissions(&self, filter: &PermissionFilter) -> Result<u64> {
        let mut tables = self.write()?;
        let mut revoked = 0;
        for p in tables.permissions.iter_mut() {
            if !p.is_deleted && filter.matches(p) {
                p.is_deleted = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}
