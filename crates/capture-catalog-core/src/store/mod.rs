//! Relational storage abstraction for the catalog.
//!
//! The [`CatalogStore`] trait covers every relational read and write the
//! core needs: captures, datasets, share groups, and share permission rows.
//! It is authoritative for existence and ownership.
//!
//! Every read filters soft-deleted records (`is_deleted = false`).
//! Implementations must make [`CatalogStore::create_share_group`] and
//! [`CatalogStore::replace_permissions`] atomic: a concurrent reader never
//! sees a group without its owner membership, or half of a grant fan-out.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{
    Capture, CaptureType, Dataset, ObjectRef, ShareGroup, User, UserSharePermission,
};

/// Filter for [`CatalogStore::list_captures`].
#[derive(Debug, Clone, Default)]
pub struct CaptureFilter {
    pub capture_type: Option<CaptureType>,
    pub owner_id: Option<Uuid>,
    pub top_level_dir: Option<String>,
}

impl CaptureFilter {
    pub fn of_type(capture_type: CaptureType) -> Self {
        Self {
            capture_type: Some(capture_type),
            ..Default::default()
        }
    }

    pub fn matches(&self, capture: &Capture) -> bool {
        self.capture_type.map_or(true, |t| capture.capture_type == t)
            && self.owner_id.map_or(true, |o| capture.owner_id == o)
            && self
                .top_level_dir
                .as_deref()
                .map_or(true, |d| capture.top_level_dir == d)
    }
}

/// Selects share rows on one object.
#[derive(Debug, Clone)]
pub struct PermissionFilter {
    pub object: ObjectRef,
    pub grantee_id: Option<Uuid>,
    pub share_group_id: Option<Uuid>,
    pub is_individual_share: Option<bool>,
}

impl PermissionFilter {
    /// Individual rows for `grantee` on `object`.
    pub fn individual(object: ObjectRef, grantee: Uuid) -> Self {
        Self {
            object,
            grantee_id: Some(grantee),
            share_group_id: None,
            is_individual_share: Some(true),
        }
    }

    /// Group-derived rows of `group` on `object`.
    pub fn group(object: ObjectRef, group: Uuid) -> Self {
        Self {
            object,
            grantee_id: None,
            share_group_id: Some(group),
            is_individual_share: Some(false),
        }
    }

    pub fn matches(&self, row: &UserSharePermission) -> bool {
        row.object == self.object
            && self.grantee_id.map_or(true, |g| row.grantee_id == g)
            && self
                .share_group_id
                .map_or(true, |g| row.share_group_id == Some(g))
            && self
                .is_individual_share
                .map_or(true, |i| row.is_individual_share == i)
    }
}

/// Abstract relational store.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn upsert_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Insert a capture. Fails if a non-deleted capture of the same owner
    /// already uses the same `(top_level_dir, channel)`.
    async fn insert_capture(&self, capture: &Capture) -> Result<()>;

    async fn get_capture(&self, id: Uuid) -> Result<Option<Capture>>;

    async fn list_captures(&self, filter: &CaptureFilter) -> Result<Vec<Capture>>;

    async fn update_capture_metadata(&self, id: Uuid, metadata: &Map<String, Value>) -> Result<()>;

    async fn soft_delete_capture(&self, id: Uuid) -> Result<()>;

    async fn upsert_dataset(&self, dataset: &Dataset) -> Result<()>;

    async fn get_dataset(&self, id: Uuid) -> Result<Option<Dataset>>;

    async fn list_datasets(&self) -> Result<Vec<Dataset>>;

    async fn link_dataset_capture(&self, dataset_id: Uuid, capture_id: Uuid) -> Result<()>;

    /// Ids of non-deleted captures linked to the dataset.
    async fn dataset_capture_ids(&self, dataset_id: Uuid) -> Result<Vec<Uuid>>;

    async fn set_dataset_authors(&self, dataset_id: Uuid, authors: &[String]) -> Result<()>;

    /// Insert the group and its stored members (owner included) atomically.
    async fn create_share_group(&self, group: &ShareGroup) -> Result<()>;

    async fn get_share_group(&self, id: Uuid) -> Result<Option<ShareGroup>>;

    async fn list_share_groups(&self) -> Result<Vec<ShareGroup>>;

    /// Groups the user owns or is a stored member of.
    async fn groups_for_user(&self, user_id: Uuid) -> Result<Vec<ShareGroup>>;

    /// Returns `true` if the membership was newly added.
    async fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool>;

    /// Returns `true` if a membership was removed.
    async fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool>;

    /// Non-deleted share rows on `object` (enabled or not).
    async fn permissions_for_object(&self, object: &ObjectRef) -> Result<Vec<UserSharePermission>>;

    /// Soft-delete rows matching `filter`, then insert `rows`, atomically.
    async fn replace_permissions(
        &self,
        filter: &PermissionFilter,
        rows: &[UserSharePermission],
    ) -> Result<()>;

    /// Soft-delete rows matching `filter`. Returns the number of rows revoked.
    async fn revoke_permissions(&self, filter: &PermissionFilter) -> Result<u64>;
}
