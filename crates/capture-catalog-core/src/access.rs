//! Access overlay resolver.
//!
//! Merges the two origins of a share grant into one effective permission
//! per `(user, object)`:
//!
//! - **Individual**: an active row with `is_individual_share = true` naming
//!   the user.
//! - **Group-derived**: an active row with `is_individual_share = false`
//!   for a share group the user currently belongs to. Standing comes from
//!   live membership (the owner always counts), not from which member a row
//!   happens to name, so membership changes take effect immediately.
//!
//! The effective level is the maximum over origins, and the object owner
//! always resolves to [`PermissionLevel::Owner`]. The resolver only reads.
//!
//! Dataset `authors` are the sorted display names of every user with an
//! effective permission on the dataset or one of its linked captures.
//! [`resync_authors`] rewrites the stored field; [`audit_authors`] reports
//! drift without writing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{bail, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    Dataset, ItemType, ObjectRef, PermissionLevel, ShareGroup, UserSharePermission,
};
use crate::store::CatalogStore;

/// Effective permission with its per-origin breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EffectivePermission {
    pub level: PermissionLevel,
    pub is_owner: bool,
    pub individual: Option<PermissionLevel>,
    pub group: Option<PermissionLevel>,
}

/// Pure merge of the grants visible to `user` on one object.
///
/// `groups` are the share groups the user belongs to; rows for other
/// groups are ignored.
pub fn merge_grants(
    user: Uuid,
    object_owner: Option<Uuid>,
    rows: &[UserSharePermission],
    groups: &[ShareGroup],
) -> Option<EffectivePermission> {
    let is_owner = object_owner == Some(user);

    let individual = rows
        .iter()
        .filter(|r| r.is_active() && r.is_individual_share && r.grantee_id == user)
        .map(|r| r.level)
        .max();

    let group = rows
        .iter()
        .filter(|r| r.is_active() && !r.is_individual_share)
        .filter(|r| {
            r.share_group_id.is_some_and(|gid| {
                groups
                    .iter()
                    .any(|g| g.id == gid && !g.is_deleted && g.contains(user))
            })
        })
        .map(|r| r.level)
        .max();

    let owner_level = is_owner.then_some(PermissionLevel::Owner);
    let level = [owner_level, individual, group].into_iter().flatten().max()?;

    Some(EffectivePermission {
        level,
        is_owner,
        individual,
        group,
    })
}

/// Owner of a capture or dataset, if it exists and is not deleted.
pub async fn object_owner<S: CatalogStore + ?Sized>(
    store: &S,
    object: &ObjectRef,
) -> Result<Option<Uuid>> {
    Ok(match object.item_type {
        ItemType::Capture => store.get_capture(object.item_id).await?.map(|c| c.owner_id),
        ItemType::Dataset => store.get_dataset(object.item_id).await?.map(|d| d.owner_id),
    })
}

/// Resolve `user`'s effective permission on `object` with its breakdown.
pub async fn resolve<S: CatalogStore + ?Sized>(
    store: &S,
    user: Uuid,
    object: &ObjectRef,
) -> Result<Option<EffectivePermission>> {
    let Some(owner) = object_owner(store, object).await? else {
        return Ok(None);
    };
    let rows = store.permissions_for_object(object).await?;
    let groups = store.groups_for_user(user).await?;
    Ok(merge_grants(user, Some(owner), &rows, &groups))
}

/// Resolve `user`'s effective permission level on `object`.
pub async fn effective_permission<S: CatalogStore + ?Sized>(
    store: &S,
    user: Uuid,
    object: &ObjectRef,
) -> Result<Option<PermissionLevel>> {
    Ok(resolve(store, user, object).await?.map(|p| p.level))
}

/// Users with any standing on `object`: the owner, individual grantees,
/// and the members of every group holding an active row.
async fn candidates_for_object<S: CatalogStore + ?Sized>(
    store: &S,
    object: &ObjectRef,
    out: &mut BTreeSet<Uuid>,
) -> Result<()> {
    if let Some(owner) = object_owner(store, object).await? {
        out.insert(owner);
    }
    let rows = store.permissions_for_object(object).await?;
    let mut seen_groups = BTreeSet::new();
    for row in rows.iter().filter(|r| r.is_active()) {
        if row.is_individual_share {
            out.insert(row.grantee_id);
        } else if let Some(gid) = row.share_group_id {
            if seen_groups.insert(gid) {
                if let Some(group) = store.get_share_group(gid).await? {
                    out.extend(group.effective_members());
                }
            }
        }
    }
    Ok(())
}

/// Live authors of a dataset, sorted and deduplicated.
pub async fn authors<S: CatalogStore + ?Sized>(store: &S, dataset_id: Uuid) -> Result<Vec<String>> {
    let Some(dataset) = store.get_dataset(dataset_id).await? else {
        bail!("dataset {} not found", dataset_id);
    };

    let mut objects = vec![ObjectRef::dataset(dataset.id)];
    objects.extend(
        store
            .dataset_capture_ids(dataset.id)
            .await?
            .into_iter()
            .map(ObjectRef::capture),
    );

    let mut candidates = BTreeSet::new();
    for object in &objects {
        candidates_for_object(store, object, &mut candidates).await?;
    }

    // Cache per-object rows and owners; per-user groups vary.
    let mut rows_by_object: HashMap<ObjectRef, Vec<UserSharePermission>> = HashMap::new();
    let mut owner_by_object: HashMap<ObjectRef, Option<Uuid>> = HashMap::new();
    for object in &objects {
        rows_by_object.insert(*object, store.permissions_for_object(object).await?);
        owner_by_object.insert(*object, object_owner(store, object).await?);
    }

    let mut names = BTreeSet::new();
    for user_id in candidates {
        let groups = store.groups_for_user(user_id).await?;
        let has_standing = objects.iter().any(|object| {
            let rows = rows_by_object.get(object).map(Vec::as_slice).unwrap_or(&[]);
            let owner = owner_by_object.get(object).copied().flatten();
            merge_grants(user_id, owner, rows, &groups).is_some()
        });
        if !has_standing {
            continue;
        }
        if let Some(user) = store.get_user(user_id).await? {
            names.insert(user.display_name().to_string());
        }
    }

    Ok(names.into_iter().collect())
}

/// Result of [`resync_authors`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorsSync {
    pub dataset_id: Uuid,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

impl AuthorsSync {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Rewrite a dataset's stored `authors` to the live resolver output.
pub async fn resync_authors<S: CatalogStore + ?Sized>(
    store: &S,
    dataset_id: Uuid,
) -> Result<AuthorsSync> {
    let Some(dataset) = store.get_dataset(dataset_id).await? else {
        bail!("dataset {} not found", dataset_id);
    };
    let live = authors(store, dataset_id).await?;
    if live != dataset.authors {
        store.set_dataset_authors(dataset_id, &live).await?;
        tracing::info!(dataset = %dataset_id, authors = ?live, "dataset authors resynchronized");
    }
    Ok(AuthorsSync {
        dataset_id,
        before: dataset.authors,
        after: live,
    })
}

/// Persist a dataset, then resync its authors.
pub async fn save_dataset<S: CatalogStore + ?Sized>(
    store: &S,
    dataset: &Dataset,
) -> Result<AuthorsSync> {
    store.upsert_dataset(dataset).await?;
    resync_authors(store, dataset.id).await
}

/// A dataset whose stored authors diverge from the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorsDrift {
    pub dataset_id: Uuid,
    pub dataset_name: String,
    pub stored: Vec<String>,
    pub live: Vec<String>,
}

/// Report every dataset with drifted authors. Each one is logged as a
/// data-integrity warning; nothing is written.
pub async fn audit_authors<S: CatalogStore + ?Sized>(store: &S) -> Result<Vec<AuthorsDrift>> {
    let mut drifts = Vec::new();
    for dataset in store.list_datasets().await? {
        let live = authors(store, dataset.id).await?;
        if live != dataset.authors {
            tracing::warn!(
                dataset = %dataset.id,
                stored = ?dataset.authors,
                live = ?live,
                "dataset authors diverge from effective permissions"
            );
            drifts.push(AuthorsDrift {
                dataset_id: dataset.id,
                dataset_name: dataset.name,
                stored: dataset.authors,
                live,
            });
        }
    }
    Ok(drifts)
}

/// Every object the user can reach among `objects`, with its level.
pub async fn visible_objects<S: CatalogStore + ?Sized>(
    store: &S,
    user: Uuid,
    objects: &[ObjectRef],
) -> Result<BTreeMap<ObjectRef, PermissionLevel>> {
    let groups = store.groups_for_user(user).await?;
    let mut out = BTreeMap::new();
    for object in objects {
        let Some(owner) = object_owner(store, object).await? else {
            continue;
        };
        let rows = store.permissions_for_object(object).await?;
        if let Some(p) = merge_grants(user, Some(owner), &rows, &groups) {
            out.insert(*object, p.level);
        }
    }
    Ok(out)
}
