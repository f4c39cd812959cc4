//! Common re-exports for convenient entity usage.

pub use super::groups_cache::{
    ActiveModel as GroupsCacheActiveModel, Column as GroupsCacheColumn, Entity as GroupsCache,
    Model as GroupsCacheModel,
};
pub use super::permission_state::{
    ActiveModel as PermissionStateActiveModel, Column as PermissionStateColumn,
    Entity as PermissionState, Model as PermissionStateModel, SubjectType,
};
pub use super::permission_sync_job::{
    ActiveModel as PermissionSyncJobActiveModel, Column as PermissionSyncJobColumn,
    Entity as PermissionSyncJob, Model as PermissionSyncJobModel, Subject,
};
pub use super::sync_job_kind::{JobPriority, JobReason, JobState, ReasonGroup};
