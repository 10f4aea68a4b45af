//! # Capture Catalog CLI (`capcat`)
//!
//! Registers captures, keeps the per-type search indices in sync with the
//! catalog, and inspects or maintains access data.
//!
//! ## Usage
//!
//! ```bash
//! capcat --config ./config/capcat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `capcat init` | Create the SQLite database and run schema migrations |
//! | `capcat user add <email>` | Create a user |
//! | `capcat capture register` | Register an archive's channels (or one capture) |
//! | `capcat capture list [--dedup]` | List captures, optionally collapsing composites |
//! | `capcat dataset create\|add` | Create datasets and link captures |
//! | `capcat ingest <capture-id>` | Extract, validate and index one capture |
//! | `capcat index ensure\|inspect\|reset <type>` | Index lifecycle |
//! | `capcat reindex <type>` | Reindex every capture of a type |
//! | `capcat access check` | Resolve a user's permission on an object |
//! | `capcat share user\|group\|revoke` | Grant or revoke shares |
//! | `capcat groups ...` | Share groups and owner-membership migration |
//! | `capcat authors resync\|audit` | Dataset author maintenance |
//! | `capcat stats` | Catalog overview |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

use capture_catalog::access_cmd::{self, ShareTarget};
use capture_catalog::capture_cmd::{self, ListArgs, RegisterArgs};
use capture_catalog::progress::ProgressMode;
use capture_catalog::{config, dataset_cmd, index_cmd, logging, migrate, stats};
use capture_catalog_core::indexing::IngestOptions;
use capture_catalog_core::models::{CaptureType, PermissionLevel};

/// Capture Catalog CLI: capture indexing and access resolution.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "capcat",
    about = "Capture Catalog: capture indexing and access resolution",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/capcat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Manage users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Register and list captures.
    Capture {
        #[command(subcommand)]
        action: CaptureAction,
    },

    /// Create datasets and link captures to them.
    Dataset {
        #[command(subcommand)]
        action: DatasetAction,
    },

    /// Extract, validate and index one capture.
    Ingest {
        /// Capture UUID.
        capture_id: String,

        /// Check the channel is present in the archive before extracting.
        #[arg(long)]
        validate_files: bool,

        /// Do not write the normalized metadata back to the catalog.
        #[arg(long)]
        no_persist: bool,
    },

    /// Search-index lifecycle.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Reindex every capture of a type.
    ///
    /// The mapping is checked once, then captures are indexed with bounded
    /// concurrency. Failed captures are reported and do not stop the batch.
    Reindex {
        /// Capture type: drf, rh or sigmf.
        capture_type: CaptureType,

        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Resolve access.
    Access {
        #[command(subcommand)]
        action: AccessAction,
    },

    /// Grant or revoke shares.
    Share {
        #[command(subcommand)]
        action: ShareAction,
    },

    /// Share groups.
    Groups {
        #[command(subcommand)]
        action: GroupAction,
    },

    /// Dataset author maintenance.
    Authors {
        #[command(subcommand)]
        action: AuthorsAction,
    },

    /// Show catalog statistics.
    Stats,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user and print its id.
    Add {
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum CaptureAction {
    /// Register captures under a top-level directory.
    ///
    /// Archive-backed types (drf) register one capture per channel found in
    /// `<archive.root>/<dir>`. Other types register a single capture with
    /// `--channel` and optional `--metadata`.
    Register {
        /// Owner email or UUID.
        #[arg(long)]
        owner: String,
        #[arg(long = "type")]
        capture_type: CaptureType,
        /// Top-level directory (virtual path of the acquisition).
        #[arg(long)]
        dir: String,
        #[arg(long)]
        channel: Option<String>,
        /// JSON file with the capture's metadata object.
        #[arg(long)]
        metadata: Option<PathBuf>,
    },

    /// List captures.
    List {
        #[arg(long = "type")]
        capture_type: Option<CaptureType>,
        /// Owner email or UUID.
        #[arg(long)]
        owner: Option<String>,
        /// Collapse each multi-channel group to its base capture.
        #[arg(long)]
        dedup: bool,
        /// Show composite groups instead of captures.
        #[arg(long, conflicts_with = "dedup")]
        groups: bool,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DatasetAction {
    /// Create a dataset and print its id.
    Create {
        /// Owner email or UUID.
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Link a capture to a dataset.
    Add {
        dataset_id: String,
        capture_id: String,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Create the index or add missing fields to its mapping.
    Ensure { capture_type: CaptureType },
    /// Compare the live mapping with the schema.
    Inspect {
        capture_type: CaptureType,
        #[arg(long)]
        json: bool,
    },
    /// Delete and recreate the index, then reindex every capture.
    Reset {
        capture_type: CaptureType,
        /// Confirm the index may be dropped.
        #[arg(long)]
        yes: bool,
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AccessAction {
    /// Print a user's effective permission on an object.
    Check {
        /// User email or UUID.
        #[arg(long)]
        user: String,
        /// `capture:<uuid>` or `dataset:<uuid>`.
        #[arg(long)]
        object: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ShareAction {
    /// Share an object with one user.
    User {
        #[arg(long)]
        grantor: String,
        #[arg(long)]
        grantee: String,
        #[arg(long)]
        object: String,
        #[arg(long)]
        level: PermissionLevel,
    },
    /// Share an object with a share group.
    Group {
        #[arg(long)]
        grantor: String,
        #[arg(long)]
        group: Uuid,
        #[arg(long)]
        object: String,
        #[arg(long)]
        level: PermissionLevel,
    },
    /// Revoke a user's or a group's share on an object.
    Revoke {
        #[arg(long, conflicts_with = "group", required_unless_present = "group")]
        user: Option<String>,
        #[arg(long)]
        group: Option<Uuid>,
        #[arg(long)]
        object: String,
    },
}

#[derive(Subcommand)]
enum GroupAction {
    /// Create a share group; the owner is always a member.
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
        /// Member emails or UUIDs.
        #[arg(long = "member")]
        members: Vec<String>,
    },
    /// Add a member.
    Add {
        group: Uuid,
        user: String,
    },
    /// Remove a member. Removing the owner requires `--admin-override`.
    Remove {
        group: Uuid,
        user: String,
        #[arg(long)]
        admin_override: bool,
    },
    /// Store every group owner as a member of their group.
    ///
    /// `--revert` removes owners from every group's stored membership,
    /// including memberships that existed before the sync.
    SyncOwners {
        #[arg(long)]
        revert: bool,
    },
}

#[derive(Subcommand)]
enum AuthorsAction {
    /// Recompute stored dataset authors.
    Resync {
        /// Only this dataset.
        #[arg(long)]
        dataset: Option<String>,
    },
    /// Report datasets whose stored authors drifted. Writes nothing.
    Audit {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

fn progress_mode(arg: Option<ProgressArg>) -> ProgressMode {
    match arg {
        Some(ProgressArg::Off) => ProgressMode::Off,
        Some(ProgressArg::Human) => ProgressMode::Human,
        Some(ProgressArg::Json) => ProgressMode::Json,
        None => ProgressMode::default_for_tty(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::User {
            action: UserAction::Add { email, name },
        } => {
            access_cmd::run_user_add(&cfg, &email, name).await?;
        }
        Commands::Capture { action } => match action {
            CaptureAction::Register {
                owner,
                capture_type,
                dir,
                channel,
                metadata,
            } => {
                capture_cmd::run_register(
                    &cfg,
                    RegisterArgs {
                        owner,
                        capture_type,
                        dir,
                        channel,
                        metadata,
                    },
                )
                .await?;
            }
            CaptureAction::List {
                capture_type,
                owner,
                dedup,
                groups,
                json,
            } => {
                capture_cmd::run_list(
                    &cfg,
                    ListArgs {
                        capture_type,
                        owner,
                        dedup,
                        groups,
                        json,
                    },
                )
                .await?;
            }
        },
        Commands::Dataset { action } => match action {
            DatasetAction::Create {
                owner,
                name,
                description,
            } => dataset_cmd::run_create(&cfg, &owner, &name, description).await?,
            DatasetAction::Add {
                dataset_id,
                capture_id,
            } => dataset_cmd::run_add_capture(&cfg, &dataset_id, &capture_id).await?,
        },
        Commands::Ingest {
            capture_id,
            validate_files,
            no_persist,
        } => {
            let options = IngestOptions {
                validate_files,
                persist_metadata: !no_persist,
            };
            capture_cmd::run_ingest(&cfg, &capture_id, options).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Ensure { capture_type } => {
                index_cmd::run_ensure(&cfg, capture_type).await?
            }
            IndexAction::Inspect { capture_type, json } => {
                index_cmd::run_inspect(&cfg, capture_type, json).await?
            }
            IndexAction::Reset {
                capture_type,
                yes,
                progress,
                json,
            } => {
                index_cmd::run_reset(&cfg, capture_type, yes, progress_mode(progress), json)
                    .await?
            }
        },
        Commands::Reindex {
            capture_type,
            progress,
            json,
        } => {
            index_cmd::run_reindex(
                &cfg,
                capture_type,
                IngestOptions::default(),
                progress_mode(progress),
                json,
            )
            .await?;
        }
        Commands::Access {
            action: AccessAction::Check { user, object, json },
        } => {
            access_cmd::run_access_check(&cfg, &user, &object, json).await?;
        }
        Commands::Share { action } => match action {
            ShareAction::User {
                grantor,
                grantee,
                object,
                level,
            } => {
                access_cmd::run_share(&cfg, &grantor, ShareTarget::User(grantee), &object, level)
                    .await?
            }
            ShareAction::Group {
                grantor,
                group,
                object,
                level,
            } => {
                access_cmd::run_share(&cfg, &grantor, ShareTarget::Group(group), &object, level)
                    .await?
            }
            ShareAction::Revoke {
                user,
                group,
                object,
            } => {
                let target = match (user, group) {
                    (Some(user), _) => ShareTarget::User(user),
                    (None, Some(group)) => ShareTarget::Group(group),
                    (None, None) => anyhow::bail!("share revoke needs --user or --group"),
                };
                access_cmd::run_revoke(&cfg, target, &object).await?;
            }
        },
        Commands::Groups { action } => match action {
            GroupAction::Create {
                owner,
                name,
                members,
            } => access_cmd::run_group_create(&cfg, &owner, &name, &members).await?,
            GroupAction::Add { group, user } => {
                access_cmd::run_group_member(&cfg, group, &user, false, false).await?
            }
            GroupAction::Remove {
                group,
                user,
                admin_override,
            } => access_cmd::run_group_member(&cfg, group, &user, true, admin_override).await?,
            GroupAction::SyncOwners { revert } => {
                access_cmd::run_sync_owners(&cfg, revert).await?
            }
        },
        Commands::Authors { action } => match action {
            AuthorsAction::Resync { dataset } => {
                access_cmd::run_authors_resync(&cfg, dataset.as_deref()).await?
            }
            AuthorsAction::Audit { json } => access_cmd::run_authors_audit(&cfg, json).await?,
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
