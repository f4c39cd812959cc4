//! permsync - repository permission synchronization for GitHub code hosts.
//!
//! The crate resolves which users can read which repositories and keeps that
//! answer fresh:
//!
//! - [`provider`] fetches permissions in both directions (user to repositories,
//!   repository to users), reusing organization and team facts through the
//!   [`groups_cache`].
//! - [`scheduler`] enqueues sync jobs for subjects that were never synced or
//!   whose permissions went stale.
//! - [`cleaner`] trims finished job history per subject.
//!
//! # Features
//!
//! - `github` - GitHub REST client ([`github::GitHubClient`]) with retry and pacing.
//! - `migrate` - Database migrations and [`connect_and_migrate`].
//! - `sqlite` / `postgres` - Database backends.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use permsync::{connect_and_migrate, DbJobStore, DbPermsStore};
//! use permsync::scheduler::{SchedulerOptions, SyncScheduler};
//!
//! let db = Arc::new(connect_and_migrate("sqlite://permsync.db?mode=rwc").await?);
//! let scheduler = SyncScheduler::new(
//!     Arc::new(DbPermsStore::new(Arc::clone(&db))),
//!     Arc::new(DbJobStore::new(db)),
//!     SchedulerOptions::default(),
//! );
//! let stats = scheduler.run_once().await?;
//! ```

pub mod cleaner;
pub mod codehost;
pub mod db;
pub mod entity;
pub mod groups_cache;
pub mod http;
pub mod perms_store;
pub mod provider;
pub mod scheduler;
pub mod sync_jobs;

#[cfg(feature = "github")]
pub mod retry;

#[cfg(feature = "github")]
pub mod github;

#[cfg(feature = "migrate")]
pub mod migration;

pub use cleaner::{CleanerOptions, JobHistoryCleaner};
pub use codehost::{ClientError, CodeHostClient};
pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use groups_cache::{CacheStore, DbCacheStore, GroupCache, MemoryCacheStore};
pub use perms_store::{DbPermsStore, PermsStore, PermsStoreError};
pub use provider::{
    FetchError, FetchPermsOptions, PermissionProvider, ProviderError, ProviderOptions,
};
pub use scheduler::{SchedulerError, SchedulerOptions, SyncScheduler};
pub use sync_jobs::{DbJobStore, JobStoreError, PermissionSyncJobStore};
