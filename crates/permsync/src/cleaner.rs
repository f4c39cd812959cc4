//! Retention of finished permission sync jobs.
//!
//! Each user and repository keeps its `history_size` most recently finished
//! jobs. Queued, Processing and Canceled rows are neither counted nor deleted.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::permission_sync_job::Subject;
use crate::sync_jobs::{FinishedJob, PermissionSyncJobStore, Result};

/// Jobs kept per subject when not configured.
pub const DEFAULT_HISTORY_SIZE: usize = 5;

/// IDs of the jobs that fall outside each subject's retention window.
///
/// Jobs are ranked per subject by `finished_at` descending (missing timestamps
/// last, ties broken by newer id first); everything after the first
/// `history_size` is returned, sorted by id.
pub fn select_excess_jobs(jobs: Vec<FinishedJob>, history_size: usize) -> Vec<i32> {
    let mut by_subject: HashMap<Subject, Vec<FinishedJob>> = HashMap::new();
    for job in jobs {
        by_subject.entry(job.subject).or_default().push(job);
    }

    let mut excess: Vec<i32> = by_subject
        .into_values()
        .flat_map(|mut jobs| {
            jobs.sort_by_key(|j| (j.finished_at.is_none(), Reverse(j.finished_at), Reverse(j.id)));
            jobs.into_iter().skip(history_size).map(|j| j.id)
        })
        .collect();
    excess.sort_unstable();
    excess
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanerOptions {
    pub history_size: usize,
}

impl Default for CleanerOptions {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

/// Periodically trims job history through a [`PermissionSyncJobStore`].
pub struct JobHistoryCleaner {
    store: Arc<dyn PermissionSyncJobStore>,
    options: CleanerOptions,
}

impl JobHistoryCleaner {
    pub fn new(store: Arc<dyn PermissionSyncJobStore>, options: CleanerOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> CleanerOptions {
        self.options
    }

    /// Run one cleaning pass. Returns the number of deleted jobs.
    pub async fn run_once(&self) -> Result<u64> {
        let deleted = self.store.clean_history(self.options.history_size).await?;
        if deleted > 0 {
            tracing::info!(
                deleted,
                history_size = self.options.history_size,
                "Cleaned permission sync job history"
            );
        } else {
            tracing::debug!("No permission sync job history to clean");
        }
        Ok(deleted)
    }
}
