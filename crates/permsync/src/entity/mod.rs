//! SeaORM entity definitions for the permsync database schema.

pub mod groups_cache;
pub mod permission_state;
pub mod permission_sync_job;
pub mod prelude;
pub mod sync_job_kind;
