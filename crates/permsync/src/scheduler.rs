//! Periodic scheduling of permission sync jobs.
//!
//! Every pass walks four candidate lists in a fixed order: users with no
//! permissions, repositories with no permissions, users with the oldest
//! permissions, repositories with the oldest permissions. Each candidate gets a
//! job whose reason and priority depend only on whether it was ever synced.
//! The job store drops requests already covered by in-flight work.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::entity::permission_sync_job::Subject;
use crate::entity::sync_job_kind::{JobPriority, JobReason};
use crate::perms_store::{PermsStore, PermsStoreError};
use crate::sync_jobs::{CreateJobOpts, JobStoreError, PermissionSyncJobStore};

pub const DEFAULT_SCHEDULE_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);
/// Oldest-permission candidates per pass when unset or negative.
pub const DEFAULT_OLDEST_BATCH_SIZE: u64 = 10;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Permission store error: {0}")]
    Perms(#[from] PermsStoreError),

    #[error("Job store error: {0}")]
    Jobs(#[from] JobStoreError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    User,
    Repo,
}

/// Reason and priority for a scheduled sync.
///
/// Subjects never synced get `*NoPermissions` at Medium priority; subjects
/// with stale permissions get `*OutdatedPermissions` at Low priority.
pub fn reason_and_priority(
    has_existing_permissions: bool,
    kind: SubjectKind,
) -> (JobReason, JobPriority) {
    match (has_existing_permissions, kind) {
        (false, SubjectKind::User) => (JobReason::UserNoPermissions, JobPriority::Medium),
        (false, SubjectKind::Repo) => (JobReason::RepoNoPermissions, JobPriority::Medium),
        (true, SubjectKind::User) => (JobReason::UserOutdatedPermissions, JobPriority::Low),
        (true, SubjectKind::Repo) => (JobReason::RepoOutdatedPermissions, JobPriority::Low),
    }
}

/// Resolve a configured batch size: unset or negative means the default,
/// zero disables.
pub fn batch_size(configured: Option<i64>) -> u64 {
    match configured {
        Some(n) if n >= 0 => n.unsigned_abs(),
        _ => DEFAULT_OLDEST_BATCH_SIZE,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Time between passes of a long-running scheduler.
    pub interval: Duration,
    /// Minimum age of a user's permissions before they are resynced.
    pub user_backoff: Duration,
    pub repo_backoff: Duration,
    pub oldest_users: Option<i64>,
    pub oldest_repos: Option<i64>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SCHEDULE_INTERVAL,
            user_backoff: DEFAULT_BACKOFF,
            repo_backoff: DEFAULT_BACKOFF,
            oldest_users: None,
            oldest_repos: None,
        }
    }
}

/// Jobs created by one pass, per candidate list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    pub users_no_perms: usize,
    pub repos_no_perms: usize,
    pub users_outdated: usize,
    pub repos_outdated: usize,
    /// Candidates already covered by an in-flight job.
    pub skipped: usize,
}

impl ScheduleStats {
    pub fn scheduled(&self) -> usize {
        self.users_no_perms + self.repos_no_perms + self.users_outdated + self.repos_outdated
    }
}

pub struct SyncScheduler {
    perms: Arc<dyn PermsStore>,
    jobs: Arc<dyn PermissionSyncJobStore>,
    options: SchedulerOptions,
}

impl SyncScheduler {
    pub fn new(
        perms: Arc<dyn PermsStore>,
        jobs: Arc<dyn PermissionSyncJobStore>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            perms,
            jobs,
            options,
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Run one scheduling pass.
    pub async fn run_once(&self) -> Result<ScheduleStats> {
        let mut stats = ScheduleStats::default();

        let users = self.perms.user_ids_with_no_perms().await?;
        stats.users_no_perms = self
            .schedule(&users, SubjectKind::User, false, &mut stats.skipped)
            .await?;

        let repos = self.perms.repo_ids_with_no_perms().await?;
        stats.repos_no_perms = self
            .schedule(&repos, SubjectKind::Repo, false, &mut stats.skipped)
            .await?;

        let limit = batch_size(self.options.oldest_users);
        if limit > 0 {
            let users = self
                .perms
                .user_ids_with_oldest_perms(limit, self.options.user_backoff)
                .await?;
            stats.users_outdated = self
                .schedule(&users, SubjectKind::User, true, &mut stats.skipped)
                .await?;
        }

        let limit = batch_size(self.options.oldest_repos);
        if limit > 0 {
            let repos = self
                .perms
                .repo_ids_with_oldest_perms(limit, self.options.repo_backoff)
                .await?;
            stats.repos_outdated = self
                .schedule(&repos, SubjectKind::Repo, true, &mut stats.skipped)
                .await?;
        }

        if stats.scheduled() > 0 {
            tracing::info!(
                users_no_perms = stats.users_no_perms,
                repos_no_perms = stats.repos_no_perms,
                users_outdated = stats.users_outdated,
                repos_outdated = stats.repos_outdated,
                skipped = stats.skipped,
                "Scheduled permission sync jobs"
            );
        } else {
            tracing::debug!(skipped = stats.skipped, "No permission sync jobs scheduled");
        }
        Ok(stats)
    }

    /// Enqueue one job per id. Returns the number created.
    async fn schedule(
        &self,
        ids: &[i32],
        kind: SubjectKind,
        has_existing_permissions: bool,
        skipped: &mut usize,
    ) -> Result<usize> {
        let (reason, priority) = reason_and_priority(has_existing_permissions, kind);
        let mut created = 0;
        for &id in ids {
            let opts = CreateJobOpts::new(reason, priority).with_no_perms(!has_existing_permissions);
            let job = match kind {
                SubjectKind::User => self.jobs.create_user_sync_job(id, opts).await?,
                SubjectKind::Repo => self.jobs.create_repo_sync_job(id, opts).await?,
            };
            match job {
                Some(_) => created += 1,
                None => {
                    let subject = match kind {
                        SubjectKind::User => Subject::User(id),
                        SubjectKind::Repo => Subject::Repo(id),
                    };
                    tracing::debug!(%subject, %priority, "sync already in flight");
                    *skipped += 1;
                }
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_and_priority() {
        assert_eq!(
            reason_and_priority(false, SubjectKind::User),
            (JobReason::UserNoPermissions, JobPriority::Medium)
        );
        assert_eq!(
            reason_and_priority(false, SubjectKind::Repo),
            (JobReason::RepoNoPermissions, JobPriority::Medium)
        );
        assert_eq!(
            reason_and_priority(true, SubjectKind::User),
            (JobReason::UserOutdatedPermissions, JobPriority::Low)
        );
        assert_eq!(
            reason_and_priority(true, SubjectKind::Repo),
            (JobReason::RepoOutdatedPermissions, JobPriority::Low)
        );
    }

    #[test]
    fn test_batch_size() {
        assert_eq!(batch_size(None), 10);
        assert_eq!(batch_size(Some(-3)), 10);
        assert_eq!(batch_size(Some(0)), 0);
        assert_eq!(batch_size(Some(25)), 25);
    }

    #[test]
    fn test_default_options() {
        let opts = SchedulerOptions::default();
        assert_eq!(opts.interval, Duration::from_secs(15));
        assert_eq!(opts.user_backoff, Duration::from_secs(60));
        assert_eq!(opts.repo_backoff, Duration::from_secs(60));
    }
}
