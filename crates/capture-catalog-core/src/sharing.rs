//! Share grant and share group mutations.
//!
//! Grants are stored per origin. An individual share is one row naming the
//! grantee. A group share fans out one group-derived row per current member,
//! written together with the removal of the group's previous rows in a
//! single store transaction. Revoking one origin never touches the other.
//!
//! A group's owner is always a member. [`remove_group_member`] refuses to
//! drop the owner unless the caller passes an administrative override.

use anyhow::Result;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ObjectRef, PermissionLevel, ShareGroup, UserSharePermission};
use crate::store::{CatalogStore, PermissionFilter};

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("share group {group} not found")]
    UnknownGroup { group: Uuid },

    #[error("cannot remove the owner of share group {group} without an administrative override")]
    OwnerRemoval { group: Uuid },

    #[error("owner level cannot be granted through a share")]
    OwnerLevel,
}

async fn require_group<S: CatalogStore + ?Sized>(store: &S, group_id: Uuid) -> Result<ShareGroup> {
    match store.get_share_group(group_id).await? {
        Some(group) => Ok(group),
        None => Err(ShareError::UnknownGroup { group: group_id }.into()),
    }
}

/// Grant `level` on `object` directly to `grantee`, replacing any previous
/// individual grant for that pair.
pub async fn share_individual<S: CatalogStore + ?Sized>(
    store: &S,
    grantor: Uuid,
    grantee: Uuid,
    object: ObjectRef,
    level: PermissionLevel,
) -> Result<UserSharePermission> {
    if level == PermissionLevel::Owner {
        return Err(ShareError::OwnerLevel.into());
    }
    let row = UserSharePermission::individual(grantor, grantee, object, level);
    store
        .replace_permissions(&PermissionFilter::individual(object, grantee), std::slice::from_ref(&row))
        .await?;
    tracing::debug!(%object, %grantee, %level, "individual share granted");
    Ok(row)
}

/// Revoke the individual grant of `grantee` on `object`. Group-derived
/// access is unaffected.
pub async fn revoke_individual<S: CatalogStore + ?Sized>(
    store: &S,
    grantee: Uuid,
    object: ObjectRef,
) -> Result<u64> {
    let revoked = store
        .revoke_permissions(&PermissionFilter::individual(object, grantee))
        .await?;
    tracing::debug!(%object, %grantee, revoked, "individual share revoked");
    Ok(revoked)
}

/// Grant `level` on `object` to a share group, fanning out one row per
/// current member (owner included).
pub async fn share_with_group<S: CatalogStore + ?Sized>(
    store: &S,
    grantor: Uuid,
    group_id: Uuid,
    object: ObjectRef,
    level: PermissionLevel,
) -> Result<Vec<UserSharePermission>> {
    if level == PermissionLevel::Owner {
        return Err(ShareError::OwnerLevel.into());
    }
    let group = require_group(store, group_id).await?;
    let rows: Vec<UserSharePermission> = group
        .effective_members()
        .into_iter()
        .map(|member| UserSharePermission::group_derived(grantor, member, group.id, object, level))
        .collect();
    store
        .replace_permissions(&PermissionFilter::group(object, group.id), &rows)
        .await?;
    tracing::debug!(%object, group = %group.id, members = rows.len(), %level, "group share granted");
    Ok(rows)
}

/// Revoke a group's grant on `object`. Individual grants are unaffected.
pub async fn revoke_group<S: CatalogStore + ?Sized>(
    store: &S,
    group_id: Uuid,
    object: ObjectRef,
) -> Result<u64> {
    let revoked = store
        .revoke_permissions(&PermissionFilter::group(object, group_id))
        .await?;
    tracing::debug!(%object, group = %group_id, revoked, "group share revoked");
    Ok(revoked)
}

/// Create a share group. The owner is stored as a member in the same
/// transaction as the group itself.
pub async fn create_share_group<S: CatalogStore + ?Sized>(
    store: &S,
    owner: Uuid,
    name: &str,
    members: &[Uuid],
) -> Result<ShareGroup> {
    let mut group = ShareGroup::new(owner, name);
    group.members.extend(members.iter().copied());
    store.create_share_group(&group).await?;
    Ok(group)
}

/// Add `user` to a group. Returns `false` if they were already a member.
pub async fn add_group_member<S: CatalogStore + ?Sized>(
    store: &S,
    group_id: Uuid,
    user: Uuid,
) -> Result<bool> {
    let group = require_group(store, group_id).await?;
    store.add_group_member(group.id, user).await
}

/// Remove `user` from a group. Removing the owner requires
/// `admin_override`.
pub async fn remove_group_member<S: CatalogStore + ?Sized>(
    store: &S,
    group_id: Uuid,
    user: Uuid,
    admin_override: bool,
) -> Result<bool> {
    let group = require_group(store, group_id).await?;
    if group.owner_id == user && !admin_override {
        return Err(ShareError::OwnerRemoval { group: group.id }.into());
    }
    if group.owner_id == user {
        tracing::warn!(group = %group.id, owner = %user, "removing group owner from stored membership by override");
    }
    store.remove_group_member(group.id, user).await
}

/// Store every group owner as a member of their own group. Returns the
/// number of memberships added; a second run returns 0.
pub async fn sync_owner_membership<S: CatalogStore + ?Sized>(store: &S) -> Result<usize> {
    let mut added = 0;
    for group in store.list_share_groups().await? {
        if store.add_group_member(group.id, group.owner_id).await? {
            added += 1;
        }
    }
    tracing::info!(added, "owner memberships synchronized");
    Ok(added)
}

/// Reverse of [`sync_owner_membership`].
///
/// Lossy: the owner is removed from the stored membership of every group,
/// including groups where that membership predates the sync. Resolution is
/// unaffected because owners count as members regardless.
pub async fn revert_owner_membership<S: CatalogStore + ?Sized>(store: &S) -> Result<usize> {
    let mut removed = 0;
    for group in store.list_share_groups().await? {
        if store.remove_group_member(group.id, group.owner_id).await? {
            removed += 1;
        }
    }
    tracing::warn!(removed, "owner memberships reverted; memberships that predate the sync are lost");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn created_group_stores_owner() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let group = create_share_group(&store, owner, "lab", &[]).await.unwrap();
        let stored = store.get_share_group(group.id).await.unwrap().unwrap();
        assert!(stored.members.contains(&owner));
    }

    #[tokio::test]
    async fn owner_removal_needs_override() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let group = create_share_group(&store, owner, "lab", &[]).await.unwrap();

        let err = remove_group_member(&store, group.id, owner, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShareError>(),
            Some(ShareError::OwnerRemoval { .. })
        ));
        let stored = store.get_share_group(group.id).await.unwrap().unwrap();
        assert!(stored.members.contains(&owner));

        assert!(remove_group_member(&store, group.id, owner, true).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_group_is_reported() {
        let store = InMemoryStore::new();
        let err = add_group_member(&store, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShareError>(),
            Some(ShareError::UnknownGroup { .. })
        ));
    }

    #[tokio::test]
    async fn group_share_fans_out_and_replaces() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        let group = create_share_group(&store, owner, "lab", &[member]).await.unwrap();
        let object = ObjectRef::dataset(Uuid::new_v4());

        let rows = share_with_group(&store, owner, group.id, object, PermissionLevel::Viewer)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| !r.is_individual_share));

        share_with_group(&store, owner, group.id, object, PermissionLevel::Contributor)
            .await
            .unwrap();
        let live = store.permissions_for_object(&object).await.unwrap();
        assert_eq!(live.len(), 2);
        assert!(live.iter().all(|r| r.level == PermissionLevel::Contributor));

        // Soft-deleted rows are kept.
        assert_eq!(store.all_permissions().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn revoking_one_origin_keeps_the_other_row() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        let group = create_share_group(&store, owner, "lab", &[member]).await.unwrap();
        let object = ObjectRef::capture(Uuid::new_v4());

        share_individual(&store, owner, member, object, PermissionLevel::Viewer)
            .await
            .unwrap();
        share_with_group(&store, owner, group.id, object, PermissionLevel::CoOwner)
            .await
            .unwrap();

        assert_eq!(revoke_group(&store, group.id, object).await.unwrap(), 2);
        let live = store.permissions_for_object(&object).await.unwrap();
        assert_eq!(live.len(), 1);
        assert!(live[0].is_individual_share);
        assert_eq!(live[0].grantee_id, member);
    }

    #[tokio::test]
    async fn owner_level_cannot_be_shared() {
        let store = InMemoryStore::new();
        let object = ObjectRef::capture(Uuid::new_v4());
        let err = share_individual(&store, Uuid::new_v4(), Uuid::new_v4(), object, PermissionLevel::Owner)
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<ShareError>(), Some(ShareError::OwnerLevel)));
    }

    #[tokio::test]
    async fn owner_sync_is_idempotent() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let group = create_share_group(&store, owner, "lab", &[]).await.unwrap();
        remove_group_member(&store, group.id, owner, true).await.unwrap();

        assert_eq!(sync_owner_membership(&store).await.unwrap(), 1);
        let first = store.get_share_group(group.id).await.unwrap().unwrap();
        assert_eq!(sync_owner_membership(&store).await.unwrap(), 0);
        let second = store.get_share_group(group.id).await.unwrap().unwrap();
        assert_eq!(first.members, second.members);
    }

    #[tokio::test]
    async fn revert_drops_owner_from_every_group() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        // Both groups had owner membership before any sync ran.
        let a = create_share_group(&store, owner, "a", &[]).await.unwrap();
        let b = create_share_group(&store, owner, "b", &[Uuid::new_v4()]).await.unwrap();
        assert_eq!(sync_owner_membership(&store).await.unwrap(), 0);

        assert_eq!(revert_owner_membership(&store).await.unwrap(), 2);
        for id in [a.id, b.id] {
            let group = store.get_share_group(id).await.unwrap().unwrap();
            assert!(!group.members.contains(&owner));
            assert!(group.contains(owner));
        }
    }
}
