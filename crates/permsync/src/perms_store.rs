//! Last-synced permission state per user and repository.
//!
//! A subject is *registered* with no permissions (`synced_at` unset) until its
//! first successful sync; the scheduler treats those as "no permissions" and
//! everything else by age of `synced_at`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use thiserror::Error;

use crate::codehost::{AccountId, RepoId};
use crate::entity::permission_state::{
    ActiveModel, Column, Entity as PermissionState, Model, SubjectType,
};

#[derive(Debug, Error)]
pub enum PermsStoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PermsStoreError>;

#[async_trait]
pub trait PermsStore: Send + Sync {
    /// Users registered but never synced.
    async fn user_ids_with_no_perms(&self) -> Result<Vec<i32>>;

    /// Repositories registered but never synced.
    async fn repo_ids_with_no_perms(&self) -> Result<Vec<i32>>;

    /// Up to `limit` users whose last sync is older than `age`, oldest first.
    async fn user_ids_with_oldest_perms(&self, limit: u64, age: Duration) -> Result<Vec<i32>>;

    /// Up to `limit` repositories whose last sync is older than `age`, oldest first.
    async fn repo_ids_with_oldest_perms(&self, limit: u64, age: Duration) -> Result<Vec<i32>>;

    /// Record a user with no permissions yet. Returns false if already known.
    async fn register_user(&self, user_id: i32) -> Result<bool>;

    async fn register_repo(&self, repo_id: i32) -> Result<bool>;

    async fn save_user_perms(&self, user_id: i32, repo_ids: &[RepoId]) -> Result<()>;

    async fn save_repo_perms(&self, repo_id: i32, account_ids: &[AccountId]) -> Result<()>;

    async fn get(&self, subject_type: SubjectType, subject_id: i32) -> Result<Option<Model>>;
}

/// [`PermsStore`] over a sea-orm connection.
#[derive(Clone)]
pub struct DbPermsStore {
    db: Arc<DatabaseConnection>,
}

impl DbPermsStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn ids_with_no_perms(&self, subject_type: SubjectType) -> Result<Vec<i32>> {
        Ok(PermissionState::find()
            .select_only()
            .column(Column::SubjectId)
            .filter(Column::SubjectType.eq(subject_type))
            .filter(Column::SyncedAt.is_null())
            .order_by_asc(Column::SubjectId)
            .into_tuple()
            .all(self.db.as_ref())
            .await?)
    }

    async fn ids_with_oldest_perms(
        &self,
        subject_type: SubjectType,
        limit: u64,
        age: Duration,
    ) -> Result<Vec<i32>> {
        let Some(cutoff) = cutoff(Utc::now(), age) else {
            return Ok(Vec::new());
        };
        Ok(PermissionState::find()
            .select_only()
            .column(Column::SubjectId)
            .filter(Column::SubjectType.eq(subject_type))
            .filter(Column::SyncedAt.lt(cutoff.fixed_offset()))
            .order_by_asc(Column::SyncedAt)
            .order_by_asc(Column::SubjectId)
            .limit(limit)
            .into_tuple()
            .all(self.db.as_ref())
            .await?)
    }

    async fn register(&self, subject_type: SubjectType, subject_id: i32) -> Result<bool> {
        let row = ActiveModel {
            subject_type: Set(subject_type),
            subject_id: Set(subject_id),
            object_ids: Set(serde_json::Value::Array(Vec::new())),
            synced_at: Set(None),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        let inserted = PermissionState::insert(row)
            .on_conflict(
                OnConflict::columns([Column::SubjectType, Column::SubjectId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(inserted > 0)
    }

    async fn save(
        &self,
        subject_type: SubjectType,
        subject_id: i32,
        object_ids: serde_json::Value,
    ) -> Result<()> {
        let now = Utc::now().fixed_offset();
        let row = ActiveModel {
            subject_type: Set(subject_type),
            subject_id: Set(subject_id),
            object_ids: Set(object_ids),
            synced_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        };
        PermissionState::insert(row)
            .on_conflict(
                OnConflict::columns([Column::SubjectType, Column::SubjectId])
                    .update_columns([Column::ObjectIds, Column::SyncedAt, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }
}

/// `now - age`, or `None` when that instant is not representable.
fn cutoff(now: DateTime<Utc>, age: Duration) -> Option<DateTime<Utc>> {
    let age = chrono::Duration::from_std(age).ok()?;
    now.checked_sub_signed(age)
}

#[async_trait]
impl PermsStore for DbPermsStore {
    async fn user_ids_with_no_perms(&self) -> Result<Vec<i32>> {
        self.ids_with_no_perms(SubjectType::User).await
    }

    async fn repo_ids_with_no_perms(&self) -> Result<Vec<i32>> {
        self.ids_with_no_perms(SubjectType::Repo).await
    }

    async fn user_ids_with_oldest_perms(&self, limit: u64, age: Duration) -> Result<Vec<i32>> {
        self.ids_with_oldest_perms(SubjectType::User, limit, age)
            .await
    }

    async fn repo_ids_with_oldest_perms(&self, limit: u64, age: Duration) -> Result<Vec<i32>> {
        self.ids_with_oldest_perms(SubjectType::Repo, limit, age)
            .await
    }

    async fn register_user(&self, user_id: i32) -> Result<bool> {
        self.register(SubjectType::User, user_id).await
    }

    async fn register_repo(&self, repo_id: i32) -> Result<bool> {
        self.register(SubjectType::Repo, repo_id).await
    }

    async fn save_user_perms(&self, user_id: i32, repo_ids: &[RepoId]) -> Result<()> {
        let ids = serde_json::to_value(repo_ids)?;
        self.save(SubjectType::User, user_id, ids).await?;
        tracing::debug!(user_id, repos = repo_ids.len(), "Saved user permissions");
        Ok(())
    }

    async fn save_repo_perms(&self, repo_id: i32, account_ids: &[AccountId]) -> Result<()> {
        let ids = serde_json::to_value(account_ids)?;
        self.save(SubjectType::Repo, repo_id, ids).await?;
        tracing::debug!(repo_id, users = account_ids.len(), "Saved repository permissions");
        Ok(())
    }

    async fn get(&self, subject_type: SubjectType, subject_id: i32) -> Result<Option<Model>> {
        Ok(PermissionState::find()
            .filter(Column::SubjectType.eq(subject_type))
            .filter(Column::SubjectId.eq(subject_id))
            .one(self.db.as_ref())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[test]
    fn cutoff_subtracts_age() {
        let now = Utc::now();
        assert_eq!(
            cutoff(now, Duration::from_secs(60)),
            Some(now - chrono::Duration::seconds(60))
        );
        assert_eq!(cutoff(now, Duration::MAX), None);
    }

    #[tokio::test]
    async fn unrepresentable_age_selects_nothing_without_querying() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let store = DbPermsStore::new(Arc::new(db));
        let ids = store
            .user_ids_with_oldest_perms(10, Duration::MAX)
            .await
            .expect("empty");
        assert!(ids.is_empty());
    }
}
