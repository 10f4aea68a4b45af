//! Core data models used throughout the capture catalog.
//!
//! These types mirror the relational records (users, captures, datasets,
//! share groups, share permissions). The search index holds a derived
//! projection of [`Capture`] metadata and is never authoritative.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Capture format tag. Selects the schema, the index name and the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CaptureType {
    /// Digital RF channel archive.
    #[serde(rename = "drf")]
    Drf,
    /// RadioHound sweep.
    #[serde(rename = "rh")]
    RadioHound,
    /// SigMF recording.
    #[serde(rename = "sigmf")]
    SigMf,
}

impl CaptureType {
    pub const ALL: [CaptureType; 3] = [CaptureType::Drf, CaptureType::RadioHound, CaptureType::SigMf];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureType::Drf => "drf",
            CaptureType::RadioHound => "rh",
            CaptureType::SigMf => "sigmf",
        }
    }

    /// Search index backing this capture type: `captures-<type>`.
    pub fn index_name(&self) -> String {
        format!("captures-{}", self.as_str())
    }

    /// Whether metadata is read from a channel archive rather than supplied
    /// with the capture record.
    pub fn is_archive_backed(&self) -> bool {
        matches!(self, CaptureType::Drf)
    }
}

impl fmt::Display for CaptureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "drf" => Ok(CaptureType::Drf),
            "rh" => Ok(CaptureType::RadioHound),
            "sigmf" => Ok(CaptureType::SigMf),
            other => bail!("Unknown capture type: '{}'. Must be drf, rh, or sigmf.", other),
        }
    }
}

/// A catalog user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub is_deleted: bool,
}

impl User {
    pub fn new(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            name,
            is_deleted: false,
        }
    }

    /// Name shown in author lists: the full name, falling back to the email.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.trim(),
            _ => &self.email,
        }
    }
}

/// One channel-level acquisition.
///
/// `(owner_id, top_level_dir, channel)` is unique among non-deleted captures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub capture_type: CaptureType,
    pub channel: String,
    pub scan_group: Option<Uuid>,
    /// Virtual path identifying the acquisition run.
    pub top_level_dir: String,
    /// Set when the capture was created as one channel of a group.
    pub is_multi_channel: bool,
    /// Normalized metadata map (output of validation).
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl Capture {
    pub fn new(
        owner_id: Uuid,
        capture_type: CaptureType,
        channel: impl Into<String>,
        top_level_dir: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            capture_type,
            channel: channel.into(),
            scan_group: None,
            top_level_dir: normalize_top_level_dir(&top_level_dir.into()),
            is_multi_channel: false,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }
}

/// Normalize a virtual directory to a single leading `/`, with empty and
/// `.` segments dropped. `..` segments are kept; see [`checked_top_level_dir`].
pub fn normalize_top_level_dir(dir: &str) -> String {
    let segments: Vec<&str> = dir
        .trim()
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", segments.join("/"))
}

/// [`normalize_top_level_dir`], rejecting directories with `..` segments.
pub fn checked_top_level_dir(dir: &str) -> anyhow::Result<String> {
    let normalized = normalize_top_level_dir(dir);
    if normalized.split('/').any(|s| s == "..") {
        bail!("Directory '{}' must not contain '..' segments", dir);
    }
    Ok(normalized)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Draft,
    Final,
}

impl DatasetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Draft => "draft",
            DatasetStatus::Final => "final",
        }
    }
}

impl FromStr for DatasetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "draft" => Ok(DatasetStatus::Draft),
            "final" => Ok(DatasetStatus::Final),
            other => bail!("Unknown dataset status: '{}'", other),
        }
    }
}

/// A named collection of captures.
///
/// `authors` is a denormalized projection of the resolver's output and is
/// only rewritten by an explicit resync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: DatasetStatus,
    pub authors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl Dataset {
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            description: None,
            status: DatasetStatus::Draft,
            authors: Vec::new(),
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }
}

/// A named set of users with one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareGroup {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    /// Stored membership. The owner is expected here too, but
    /// [`ShareGroup::contains`] treats the owner as a member regardless.
    pub members: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl ShareGroup {
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        let mut members = BTreeSet::new();
        members.insert(owner_id);
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            members,
            created_at: Utc::now(),
            is_deleted: false,
        }
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id || self.members.contains(&user_id)
    }

    /// Owner plus stored members, deduplicated.
    pub fn effective_members(&self) -> BTreeSet<Uuid> {
        let mut all = self.members.clone();
        all.insert(self.owner_id);
        all
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Capture,
    Dataset,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Capture => "capture",
            ItemType::Dataset => "dataset",
        }
    }
}

impl FromStr for ItemType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "capture" => Ok(ItemType::Capture),
            "dataset" => Ok(ItemType::Dataset),
            other => bail!("Unknown item type: '{}'. Must be capture or dataset.", other),
        }
    }
}

/// Reference to a shareable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub item_type: ItemType,
    pub item_id: Uuid,
}

impl ObjectRef {
    pub fn capture(id: Uuid) -> Self {
        Self {
            item_type: ItemType::Capture,
            item_id: id,
        }
    }

    pub fn dataset(id: Uuid) -> Self {
        Self {
            item_type: ItemType::Dataset,
            item_id: id,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.item_type.as_str(), self.item_id)
    }
}

/// Access level, ordered from least to most permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Viewer,
    Contributor,
    CoOwner,
    Owner,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Viewer => "viewer",
            PermissionLevel::Contributor => "contributor",
            PermissionLevel::CoOwner => "co_owner",
            PermissionLevel::Owner => "owner",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "viewer" => Ok(PermissionLevel::Viewer),
            "contributor" => Ok(PermissionLevel::Contributor),
            "co_owner" => Ok(PermissionLevel::CoOwner),
            "owner" => Ok(PermissionLevel::Owner),
            other => bail!("Unknown permission level: '{}'", other),
        }
    }
}

/// One share row.
///
/// Individual rows (`is_individual_share = true`) grant `level` directly to
/// `grantee_id`. Group-derived rows carry `share_group_id` and stand for the
/// group's grant on the object; the two origins are never collapsed so that
/// revoking one leaves the other intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSharePermission {
    pub id: Uuid,
    /// User who granted the share (the object owner or a co-owner).
    pub owner_id: Uuid,
    pub grantee_id: Uuid,
    pub object: ObjectRef,
    pub level: PermissionLevel,
    pub is_individual_share: bool,
    pub share_group_id: Option<Uuid>,
    pub is_enabled: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl UserSharePermission {
    pub fn individual(owner_id: Uuid, grantee_id: Uuid, object: ObjectRef, level: PermissionLevel) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            grantee_id,
            object,
            level,
            is_individual_share: true,
            share_group_id: None,
            is_enabled: true,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    pub fn group_derived(
        owner_id: Uuid,
        grantee_id: Uuid,
        group_id: Uuid,
        object: ObjectRef,
        level: PermissionLevel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            grantee_id,
            object,
            level,
            is_individual_share: false,
            share_group_id: Some(group_id),
            is_enabled: true,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    /// Live rows: enabled and not soft-deleted.
    pub fn is_active(&self) -> bool {
        self.is_enabled && !self.is_deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_type_index_names() {
        assert_eq!(CaptureType::Drf.index_name(), "captures-drf");
        assert_eq!(CaptureType::RadioHound.index_name(), "captures-rh");
        assert_eq!("sigmf".parse::<CaptureType>().unwrap(), CaptureType::SigMf);
        assert!("wav".parse::<CaptureType>().is_err());
    }

    #[test]
    fn permission_levels_are_ordered() {
        assert!(PermissionLevel::Viewer < PermissionLevel::Contributor);
        assert!(PermissionLevel::Contributor < PermissionLevel::CoOwner);
        assert!(PermissionLevel::CoOwner < PermissionLevel::Owner);
    }

    #[test]
    fn top_level_dir_is_normalized() {
        assert_eq!(normalize_top_level_dir("run-42/"), "/run-42");
        assert_eq!(normalize_top_level_dir("//a/b//"), "/a/b");
        assert_eq!(normalize_top_level_dir("/a//b"), normalize_top_level_dir("/a/b"));
        assert_eq!(normalize_top_level_dir("/a/./b"), "/a/b");
    }

    #[test]
    fn parent_segments_are_rejected() {
        assert!(checked_top_level_dir("/../../x").is_err());
        assert!(checked_top_level_dir("/a/../b").is_err());
        assert_eq!(checked_top_level_dir("a//b/").unwrap(), "/a/b");
    }

    #[test]
    fn new_group_contains_owner() {
        let owner = Uuid::new_v4();
        let group = ShareGroup::new(owner, "lab");
        assert!(group.members.contains(&owner));
        assert!(group.contains(owner));
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let mut user = User::new("a@example.org", Some("  ".to_string()));
        assert_eq!(user.display_name(), "a@example.org");
        user.name = Some("Ada Lovelace".to_string());
        assert_eq!(user.display_name(), "Ada Lovelace");
    }
}
