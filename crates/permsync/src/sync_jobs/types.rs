use chrono::{DateTime, FixedOffset, Utc};

use crate::entity::permission_sync_job::Subject;
use crate::entity::sync_job_kind::{JobPriority, JobReason, JobState, ReasonGroup};

/// Options for enqueuing a sync job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJobOpts {
    pub reason: JobReason,
    pub priority: JobPriority,
    pub invalidate_caches: bool,
    pub no_perms: bool,
    /// Delay processing until this instant. Delayed jobs skip deduplication.
    pub process_after: Option<DateTime<Utc>>,
    pub triggered_by_user_id: Option<i32>,
}

impl CreateJobOpts {
    pub fn new(reason: JobReason, priority: JobPriority) -> Self {
        Self {
            reason,
            priority,
            invalidate_caches: false,
            no_perms: false,
            process_after: None,
            triggered_by_user_id: None,
        }
    }

    /// Administrator-requested sync. Always High priority.
    pub fn manual(reason: JobReason, triggered_by_user_id: Option<i32>) -> Self {
        Self {
            triggered_by_user_id,
            ..Self::new(reason, JobPriority::High)
        }
    }

    #[must_use]
    pub fn with_invalidate_caches(mut self, invalidate: bool) -> Self {
        self.invalidate_caches = invalidate;
        self
    }

    #[must_use]
    pub fn with_no_perms(mut self, no_perms: bool) -> Self {
        self.no_perms = no_perms;
        self
    }

    #[must_use]
    pub fn with_process_after(mut self, at: DateTime<Utc>) -> Self {
        self.process_after = Some(at);
        self
    }
}

/// Filters for listing jobs. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListJobsOptions {
    pub state: Option<JobState>,
    pub user_id: Option<i32>,
    pub repository_id: Option<i32>,
    pub reason_group: Option<ReasonGroup>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Order by id descending instead of ascending.
    pub newest_first: bool,
}

/// The fields of a terminal job that history retention needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishedJob {
    pub id: i32,
    pub subject: Subject,
    pub finished_at: Option<DateTime<FixedOffset>>,
}
