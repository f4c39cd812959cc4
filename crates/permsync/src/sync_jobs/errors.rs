use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Sync job not found: id={0}")]
    NotFound(i32),

    /// The requested transition is not allowed from the job's current state.
    #[error("Sync job {id} is {state}, cannot mark it {target}")]
    InvalidTransition {
        id: i32,
        state: String,
        target: String,
    },
}

pub type Result<T> = std::result::Result<T, JobStoreError>;
