use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, sea_query::OnConflict,
};

use super::{CacheStore, Result};
use crate::entity::groups_cache::{ActiveModel, Column, Entity as GroupsCache};

/// [`CacheStore`] backed by the `groups_cache` table.
#[derive(Clone)]
pub struct DbCacheStore {
    db: Arc<DatabaseConnection>,
}

impl DbCacheStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CacheStore for DbCacheStore {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let now = Utc::now();
        // Out-of-range TTLs are clamped to a century.
        let century = chrono::Duration::days(36_500);
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(century).min(century);
        let expires_at = now + ttl;

        let model = ActiveModel {
            cache_key: Set(key.to_string()),
            value: Set(value),
            expires_at: Set(expires_at.fixed_offset()),
            cached_at: Set(now.fixed_offset()),
        };

        GroupsCache::insert(model)
            .on_conflict(
                OnConflict::column(Column::CacheKey)
                    .update_columns([Column::Value, Column::ExpiresAt, Column::CachedAt])
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Utc::now().fixed_offset();
        let entry = GroupsCache::find()
            .filter(Column::CacheKey.eq(key))
            .filter(Column::ExpiresAt.gt(now))
            .one(self.db.as_ref())
            .await?;

        Ok(entry.map(|e| e.value))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        GroupsCache::delete_many()
            .filter(Column::CacheKey.eq(key))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}

/// Purge entries that expired before `now`. Returns the number removed.
pub async fn delete_expired(db: &DatabaseConnection, now: DateTime<Utc>) -> Result<u64> {
    let result = GroupsCache::delete_many()
        .filter(Column::ExpiresAt.lte(now.fixed_offset()))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_get_returns_value_from_row() {
        let now = Utc::now().fixed_offset();
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![crate::entity::groups_cache::Model {
                cache_key: "ns:v2/acme".to_string(),
                value: b"{}".to_vec(),
                expires_at: now,
                cached_at: now,
            }]])
            .into_connection();

        let store = DbCacheStore::new(Arc::new(db));
        assert_eq!(store.get("ns:v2/acme").await.unwrap(), Some(b"{}".to_vec()));
    }

    #[tokio::test]
    async fn test_delete_expired_reports_rows_affected() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 3,
            }])
            .into_connection();

        assert_eq!(delete_expired(&db, Utc::now()).await.unwrap(), 3);
    }
}
