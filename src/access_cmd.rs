//! Users, sharing and access maintenance commands.
//!
//! | Command | Effect |
//! |---------|--------|
//! | `capcat user add` | Create a user |
//! | `capcat access check` | Resolve a user's effective permission on an object |
//! | `capcat share user\|group\|revoke` | Grant or revoke shares |
//! | `capcat groups create\|add\|remove` | Manage share groups |
//! | `capcat groups sync-owners [--revert]` | Owner-as-member migration |
//! | `capcat authors resync\|audit` | Maintain dataset author lists |

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use capture_catalog_core::access::{self, audit_authors, resync_authors};
use capture_catalog_core::models::{ItemType, ObjectRef, PermissionLevel, User};
use capture_catalog_core::sharing;
use capture_catalog_core::store::CatalogStore;

use crate::config::Config;
use crate::context;
use crate::sqlite_store::SqliteStore;

/// Look a user up by UUID or email.
pub async fn resolve_user(store: &SqliteStore, key: &str) -> Result<User> {
    let found = match Uuid::parse_str(key) {
        Ok(id) => store.get_user(id).await?,
        Err(_) => store.find_user_by_email(key).await?,
    };
    found.with_context(|| format!("Unknown user: '{}'", key))
}

/// Parse `capture:<uuid>` or `dataset:<uuid>`.
pub fn parse_object(s: &str) -> Result<ObjectRef> {
    let (kind, id) = s
        .split_once(':')
        .with_context(|| format!("Invalid object '{}': expected <capture|dataset>:<uuid>", s))?;
    let item_type: ItemType = kind.parse()?;
    let item_id =
        Uuid::parse_str(id).with_context(|| format!("Invalid object id: '{}'", id))?;
    Ok(ObjectRef { item_type, item_id })
}

pub async fn run_user_add(config: &Config, email: &str, name: Option<String>) -> Result<()> {
    let store = context::store_only(config).await?;
    if store.find_user_by_email(email).await?.is_some() {
        store.pool().close().await;
        bail!("A user with email '{}' already exists", email);
    }
    let user = User::new(email, name);
    store.upsert_user(&user).await?;
    store.pool().close().await;
    println!("{}", user.id);
    Ok(())
}

pub async fn run_access_check(config: &Config, user: &str, object: &str, json: bool) -> Result<()> {
    let store = context::store_only(config).await?;
    let user = resolve_user(&store, user).await?;
    let object = parse_object(object)?;
    let resolved = access::resolve(&store, user.id, &object).await;
    store.pool().close().await;
    let resolved = resolved?;

    if json {
        let out = serde_json::json!({
            "user": user.id,
            "object": object.to_string(),
            "permission": resolved,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match resolved {
        None => println!("{} has no access to {}", user.display_name(), object),
        Some(p) => {
            println!("{} on {}: {}", user.display_name(), object, p.level);
            if p.is_owner {
                println!("  owner");
            }
            if let Some(level) = p.individual {
                println!("  individual share: {}", level);
            }
            if let Some(level) = p.group {
                println!("  group share:      {}", level);
            }
        }
    }
    Ok(())
}

/// Target of `capcat share`.
pub enum ShareTarget {
    User(String),
    Group(Uuid),
}

pub async fn run_share(
    config: &Config,
    grantor: &str,
    target: ShareTarget,
    object: &str,
    level: PermissionLevel,
) -> Result<()> {
    let store = context::store_only(config).await?;
    let grantor = resolve_user(&store, grantor).await?;
    let object = parse_object(object)?;
    let result = match target {
        ShareTarget::User(grantee) => {
            let grantee = resolve_user(&store, &grantee).await?;
            sharing::share_individual(&store, grantor.id, grantee.id, object, level)
                .await
                .map(|_| format!("shared {} with {} as {}", object, grantee.display_name(), level))
        }
        ShareTarget::Group(group) => {
            sharing::share_with_group(&store, grantor.id, group, object, level)
                .await
                .map(|rows| format!("shared {} with group {} as {} ({} members)", object, group, level, rows.len()))
        }
    };
    store.pool().close().await;
    println!("{}", result?);
    Ok(())
}

pub async fn run_revoke(config: &Config, target: ShareTarget, object: &str) -> Result<()> {
    let store = context::store_only(config).await?;
    let object = parse_object(object)?;
    let result = match target {
        ShareTarget::User(grantee) => {
            let grantee = resolve_user(&store, &grantee).await?;
            sharing::revoke_individual(&store, grantee.id, object).await
        }
        ShareTarget::Group(group) => sharing::revoke_group(&store, group, object).await,
    };
    store.pool().close().await;
    println!("revoked {} share row(s) on {}", result?, object);
    Ok(())
}

pub async fn run_group_create(
    config: &Config,
    owner: &str,
    name: &str,
    members: &[String],
) -> Result<()> {
    let store = context::store_only(config).await?;
    let owner = resolve_user(&store, owner).await?;
    let mut member_ids = Vec::with_capacity(members.len());
    for member in members {
        member_ids.push(resolve_user(&store, member).await?.id);
    }
    let group = sharing::create_share_group(&store, owner.id, name, &member_ids).await;
    store.pool().close().await;
    println!("{}", group?.id);
    Ok(())
}

pub async fn run_group_member(
    config: &Config,
    group: Uuid,
    user: &str,
    remove: bool,
    admin_override: bool,
) -> Result<()> {
    let store = context::store_only(config).await?;
    let user = resolve_user(&store, user).await?;
    let result = if remove {
        sharing::remove_group_member(&store, group, user.id, admin_override).await
    } else {
        sharing::add_group_member(&store, group, user.id).await
    };
    store.pool().close().await;
    let changed = result?;
    let verb = match (remove, changed) {
        (false, true) => "added",
        (false, false) => "already a member:",
        (true, true) => "removed",
        (true, false) => "not a member:",
    };
    println!("{} {}", verb, user.display_name());
    Ok(())
}

pub async fn run_sync_owners(config: &Config, revert: bool) -> Result<()> {
    let store = context::store_only(config).await?;
    let result = if revert {
        sharing::revert_owner_membership(&store).await
    } else {
        sharing::sync_owner_membership(&store).await
    };
    store.pool().close().await;
    let changed = result?;
    if revert {
        println!("removed owner membership from {} group(s)", changed);
    } else {
        println!("added owner membership to {} group(s)", changed);
    }
    Ok(())
}

pub async fn run_authors_resync(config: &Config, dataset: Option<&str>) -> Result<()> {
    let store = context::store_only(config).await?;
    let result = resync(&store, dataset).await;
    store.pool().close().await;
    let (checked, changed) = result?;
    println!("authors resynced: {} dataset(s) checked, {} changed", checked, changed);
    Ok(())
}

async fn resync(store: &SqliteStore, dataset: Option<&str>) -> Result<(usize, usize)> {
    let ids: Vec<Uuid> = match dataset {
        Some(id) => vec![Uuid::parse_str(id).with_context(|| format!("Invalid dataset id: '{}'", id))?],
        None => store.list_datasets().await?.into_iter().map(|d| d.id).collect(),
    };
    let mut changed = 0;
    for id in &ids {
        let sync = resync_authors(store, *id).await?;
        if sync.changed() {
            println!("  {}: {:?} -> {:?}", id, sync.before, sync.after);
            changed += 1;
        }
    }
    Ok((ids.len(), changed))
}

pub async fn run_authors_audit(config: &Config, json: bool) -> Result<()> {
    let store = context::store_only(config).await?;
    let drifts = audit_authors(&store).await;
    store.pool().close().await;
    let drifts = drifts?;

    if json {
        println!("{}", serde_json::to_string_pretty(&drifts)?);
        return Ok(());
    }
    if drifts.is_empty() {
        println!("authors consistent");
        return Ok(());
    }
    for drift in &drifts {
        println!(
            "{}  {}\n  stored: {:?}\n  live:   {:?}",
            drift.dataset_id, drift.dataset_name, drift.stored, drift.live
        );
    }
    Ok(())
}
