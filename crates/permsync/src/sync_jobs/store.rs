use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::entity::permission_sync_job::{
    ActiveModel, Column, Entity as PermissionSyncJob, Model, Subject,
};
use crate::entity::sync_job_kind::JobState;

use super::errors::{JobStoreError, Result};
use super::types::{CreateJobOpts, FinishedJob, ListJobsOptions};

/// Cancellation reason recorded on a queued job superseded by a higher-priority one.
pub const HIGHER_PRIORITY_CANCELLATION_REASON: &str = "A job with higher priority was added.";

/// Storage for permission sync jobs.
#[async_trait]
pub trait PermissionSyncJobStore: Send + Sync {
    /// Enqueue a user sync. `Ok(None)` when an in-flight job already covers it.
    async fn create_user_sync_job(&self, user_id: i32, opts: CreateJobOpts)
    -> Result<Option<Model>>;

    /// Enqueue a repository sync. `Ok(None)` when an in-flight job already covers it.
    async fn create_repo_sync_job(&self, repo_id: i32, opts: CreateJobOpts)
    -> Result<Option<Model>>;

    async fn list(&self, opts: ListJobsOptions) -> Result<Vec<Model>>;

    /// Cancel every Queued job of `subject`. Returns the number canceled.
    async fn cancel_queued(&self, subject: Subject, reason: &str) -> Result<u64>;

    async fn mark_processing(&self, id: i32) -> Result<Model>;
    async fn mark_completed(&self, id: i32) -> Result<Model>;
    /// Record a retryable failure and bump `num_failures`.
    async fn mark_errored(&self, id: i32, message: &str) -> Result<Model>;
    async fn mark_failed(&self, id: i32, message: &str) -> Result<Model>;

    /// Completed, Errored and Failed jobs that have a subject.
    async fn finished_jobs(&self) -> Result<Vec<FinishedJob>>;

    async fn delete_jobs(&self, ids: &[i32]) -> Result<u64>;

    /// Keep the `history_size` most recently finished jobs per subject and
    /// delete the rest. Returns the number of deleted rows.
    async fn clean_history(&self, history_size: usize) -> Result<u64> {
        let finished = self.finished_jobs().await?;
        let excess = crate::cleaner::select_excess_jobs(finished, history_size);
        self.delete_jobs(&excess).await
    }
}

/// [`PermissionSyncJobStore`] over a sea-orm connection.
#[derive(Clone)]
pub struct DbJobStore {
    db: Arc<DatabaseConnection>,
}

impl DbJobStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn create_sync_job(&self, subject: Subject, opts: CreateJobOpts) -> Result<Option<Model>> {
        let txn = self.db.begin().await?;

        if opts.process_after.is_none() {
            if let Some(existing) = covering_job(&txn, subject, &opts).await? {
                tracing::debug!(
                    %subject,
                    existing_id = existing.id,
                    existing_priority = %existing.priority,
                    requested_priority = %opts.priority,
                    "Sync job already in flight, skipping"
                );
                txn.commit().await?;
                return Ok(None);
            }

            let canceled = PermissionSyncJob::update_many()
                .col_expr(Column::State, Expr::value(JobState::Canceled))
                .col_expr(Column::Cancel, Expr::value(true))
                .col_expr(
                    Column::CancellationReason,
                    Expr::value(HIGHER_PRIORITY_CANCELLATION_REASON),
                )
                .col_expr(Column::FinishedAt, Expr::value(Utc::now().fixed_offset()))
                .filter(subject.column().eq(subject.id()))
                .filter(Column::State.eq(JobState::Queued))
                .filter(Column::Priority.lt(opts.priority))
                .exec(&txn)
                .await?;
            if canceled.rows_affected > 0 {
                tracing::debug!(
                    %subject,
                    canceled = canceled.rows_affected,
                    "Canceled lower-priority queued sync jobs"
                );
            }
        }

        let (user_id, repository_id) = match subject {
            Subject::User(id) => (Some(id), None),
            Subject::Repo(id) => (None, Some(id)),
        };
        let job = ActiveModel {
            state: Set(JobState::Queued),
            reason: Set(opts.reason),
            priority: Set(opts.priority),
            user_id: Set(user_id),
            repository_id: Set(repository_id),
            triggered_by_user_id: Set(opts.triggered_by_user_id),
            invalidate_caches: Set(opts.invalidate_caches),
            no_perms: Set(opts.no_perms),
            failure_message: Set(None),
            queued_at: Set(Utc::now().fixed_offset()),
            started_at: Set(None),
            finished_at: Set(None),
            process_after: Set(opts.process_after.map(|t| t.fixed_offset())),
            num_resets: Set(0),
            num_failures: Set(0),
            cancel: Set(false),
            cancellation_reason: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(Some(job))
    }

    async fn transition(
        &self,
        id: i32,
        from: &[JobState],
        target: JobState,
        apply: impl FnOnce(&Model, &mut ActiveModel) + Send,
    ) -> Result<Model> {
        let job = PermissionSyncJob::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(JobStoreError::NotFound(id))?;
        if !from.contains(&job.state) {
            return Err(JobStoreError::InvalidTransition {
                id,
                state: job.state.to_string(),
                target: target.to_string(),
            });
        }

        let mut active: ActiveModel = job.clone().into();
        active.state = Set(target);
        apply(&job, &mut active);
        Ok(active.update(self.db.as_ref()).await?)
    }
}

/// An in-flight job for `subject` whose priority is at least the requested one.
async fn covering_job(
    txn: &DatabaseTransaction,
    subject: Subject,
    opts: &CreateJobOpts,
) -> Result<Option<Model>> {
    Ok(PermissionSyncJob::find()
        .filter(subject.column().eq(subject.id()))
        .filter(Column::State.is_in(JobState::IN_FLIGHT))
        .filter(Column::Priority.gte(opts.priority))
        .order_by_desc(Column::Priority)
        .one(txn)
        .await?)
}

#[async_trait]
impl PermissionSyncJobStore for DbJobStore {
    async fn create_user_sync_job(
        &self,
        user_id: i32,
        opts: CreateJobOpts,
    ) -> Result<Option<Model>> {
        self.create_sync_job(Subject::User(user_id), opts).await
    }

    async fn create_repo_sync_job(
        &self,
        repo_id: i32,
        opts: CreateJobOpts,
    ) -> Result<Option<Model>> {
        self.create_sync_job(Subject::Repo(repo_id), opts).await
    }

    async fn list(&self, opts: ListJobsOptions) -> Result<Vec<Model>> {
        let mut query = PermissionSyncJob::find();
        if let Some(state) = opts.state {
            query = query.filter(Column::State.eq(state));
        }
        if let Some(user_id) = opts.user_id {
            query = query.filter(Column::UserId.eq(user_id));
        }
        if let Some(repository_id) = opts.repository_id {
            query = query.filter(Column::RepositoryId.eq(repository_id));
        }
        if let Some(group) = opts.reason_group {
            query = query.filter(Column::Reason.is_in(group.reasons()));
        }
        query = if opts.newest_first {
            query.order_by_desc(Column::Id)
        } else {
            query.order_by_asc(Column::Id)
        };
        if let Some(offset) = opts.offset {
            query = query.offset(offset);
        }
        if let Some(limit) = opts.limit {
            query = query.limit(limit);
        }
        Ok(query.all(self.db.as_ref()).await?)
    }

    async fn cancel_queued(&self, subject: Subject, reason: &str) -> Result<u64> {
        let result = PermissionSyncJob::update_many()
            .col_expr(Column::State, Expr::value(JobState::Canceled))
            .col_expr(Column::Cancel, Expr::value(true))
            .col_expr(Column::CancellationReason, Expr::value(reason))
            .col_expr(Column::FinishedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(subject.column().eq(subject.id()))
            .filter(Column::State.eq(JobState::Queued))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }

    async fn mark_processing(&self, id: i32) -> Result<Model> {
        self.transition(id, &[JobState::Queued], JobState::Processing, |_, active| {
            active.started_at = Set(Some(Utc::now().fixed_offset()));
        })
        .await
    }

    async fn mark_completed(&self, id: i32) -> Result<Model> {
        self.transition(id, &[JobState::Processing], JobState::Completed, |_, active| {
            active.finished_at = Set(Some(Utc::now().fixed_offset()));
        })
        .await
    }

    async fn mark_errored(&self, id: i32, message: &str) -> Result<Model> {
        let message = message.to_string();
        self.transition(id, &[JobState::Processing], JobState::Errored, |job, active| {
            active.finished_at = Set(Some(Utc::now().fixed_offset()));
            active.failure_message = Set(Some(message));
            active.num_failures = Set(job.num_failures + 1);
        })
        .await
    }

    async fn mark_failed(&self, id: i32, message: &str) -> Result<Model> {
        let message = message.to_string();
        self.transition(id, &[JobState::Processing], JobState::Failed, |_, active| {
            active.finished_at = Set(Some(Utc::now().fixed_offset()));
            active.failure_message = Set(Some(message));
        })
        .await
    }

    async fn finished_jobs(&self) -> Result<Vec<FinishedJob>> {
        let rows: Vec<(i32, Option<i32>, Option<i32>, Option<chrono::DateTime<chrono::FixedOffset>>)> =
            PermissionSyncJob::find()
                .select_only()
                .columns([
                    Column::Id,
                    Column::UserId,
                    Column::RepositoryId,
                    Column::FinishedAt,
                ])
                .filter(Column::State.is_in(JobState::TERMINAL))
                .into_tuple()
                .all(self.db.as_ref())
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, user_id, repository_id, finished_at)| {
                let subject = match (user_id, repository_id) {
                    (Some(uid), _) => Subject::User(uid),
                    (None, Some(rid)) => Subject::Repo(rid),
                    (None, None) => return None,
                };
                Some(FinishedJob {
                    id,
                    subject,
                    finished_at,
                })
            })
            .collect())
    }

    async fn delete_jobs(&self, ids: &[i32]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut deleted = 0;
        // Bounded IN lists keep SQLite under its bind-variable limit.
        for chunk in ids.chunks(500) {
            let result = PermissionSyncJob::delete_many()
                .filter(Column::Id.is_in(chunk.iter().copied()))
                .exec(self.db.as_ref())
                .await?;
            deleted += result.rows_affected;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::sync_job_kind::{JobPriority, JobReason};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn job(id: i32, state: JobState) -> Model {
        Model {
            id,
            state,
            reason: JobReason::UserNoPermissions,
            priority: JobPriority::Medium,
            user_id: Some(1),
            repository_id: None,
            triggered_by_user_id: None,
            invalidate_caches: false,
            no_perms: true,
            failure_message: None,
            queued_at: Utc::now().fixed_offset(),
            started_at: None,
            finished_at: None,
            process_after: None,
            num_resets: 0,
            num_failures: 0,
            cancel: false,
            cancellation_reason: None,
        }
    }

    #[tokio::test]
    async fn completing_a_queued_job_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![job(3, JobState::Queued)]])
            .into_connection();
        let store = DbJobStore::new(Arc::new(db));

        let err = store.mark_completed(3).await.expect_err("invalid");
        assert!(matches!(
            err,
            JobStoreError::InvalidTransition { id: 3, .. }
        ));
        assert!(err.to_string().contains("queued"));
    }

    #[tokio::test]
    async fn missing_job_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([Vec::<Model>::new()])
            .into_connection();
        let store = DbJobStore::new(Arc::new(db));

        let err = store.mark_processing(99).await.expect_err("missing");
        assert!(matches!(err, JobStoreError::NotFound(99)));
    }

    #[tokio::test]
    async fn delete_jobs_with_no_ids_skips_the_database() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let store = DbJobStore::new(Arc::new(db));
        assert_eq!(store.delete_jobs(&[]).await.expect("noop"), 0);
    }
}
