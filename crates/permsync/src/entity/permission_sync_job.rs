//! PermissionSyncJob entity - one queued, running or finished permission sync.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sync_job_kind::{JobPriority, JobReason, JobState};

/// A sync job targets exactly one of `user_id` or `repository_id`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "permission_sync_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub state: JobState,
    pub reason: JobReason,
    pub priority: JobPriority,

    pub user_id: Option<i32>,
    pub repository_id: Option<i32>,
    /// Administrator who requested a manual sync.
    pub triggered_by_user_id: Option<i32>,

    /// Bypass the groups cache when the job runs.
    pub invalidate_caches: bool,
    /// The subject had no permissions at all when the job was created.
    pub no_perms: bool,

    #[sea_orm(column_type = "Text", nullable)]
    pub failure_message: Option<String>,

    pub queued_at: DateTimeWithTimeZone,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub finished_at: Option<DateTimeWithTimeZone>,
    /// Delayed jobs are not picked up before this instant and skip deduplication.
    pub process_after: Option<DateTimeWithTimeZone>,

    pub num_resets: i32,
    pub num_failures: i32,

    pub cancel: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub cancellation_reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// The user or repository a job synchronizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Subject {
    User(i32),
    Repo(i32),
}

impl Subject {
    pub fn column(self) -> Column {
        match self {
            Subject::User(_) => Column::UserId,
            Subject::Repo(_) => Column::RepositoryId,
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Subject::User(id) | Subject::Repo(id) => id,
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::User(id) => write!(f, "user {id}"),
            Subject::Repo(id) => write!(f, "repo {id}"),
        }
    }
}

impl Model {
    /// The job's subject, or `None` for a malformed row with neither ID set.
    pub fn subject(&self) -> Option<Subject> {
        match (self.user_id, self.repository_id) {
            (Some(id), _) => Some(Subject::User(id)),
            (None, Some(id)) => Some(Subject::Repo(id)),
            (None, None) => None,
        }
    }
}
