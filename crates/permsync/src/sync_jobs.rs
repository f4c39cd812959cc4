//! Persistence and state transitions for permission sync jobs.
//!
//! Job creation deduplicates against in-flight work for the same subject: a
//! request is dropped when a Queued or Processing job of equal or higher
//! priority exists, and lower-priority Queued jobs are canceled in favor of
//! the new one. Delayed jobs (`process_after` set) bypass deduplication.

mod errors;
mod store;
mod types;

pub use errors::{JobStoreError, Result};
pub use store::{DbJobStore, HIGHER_PRIORITY_CANCELLATION_REASON, PermissionSyncJobStore};
pub use types::{CreateJobOpts, FinishedJob, ListJobsOptions};
