//! Cache of organization and team access facts.
//!
//! A [`CachedGroup`] records which repositories an org or team grants access to
//! and which accounts belong to it. Either side may be unknown: user-centric
//! syncs fill in repositories, repo-centric syncs fill in users, and each
//! direction reuses what the other one learned.
//!
//! Entries are JSON-encoded and stored through a [`CacheStore`], a byte-oriented
//! key/value store with per-entry TTL. Read failures never reach the caller;
//! they degrade to a cache miss.

mod db;
mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codehost::{AccountId, RepoId};

pub use db::{DbCacheStore, delete_expired};
pub use memory::MemoryCacheStore;

/// Version segment of every key. Bumping it orphans all earlier entries.
pub const GROUPS_CACHE_VERSION: &str = "v2";

/// Errors raised by a [`CacheStore`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Byte-oriented key/value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Returns `None` for missing or expired keys.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Access facts for one organization or team.
///
/// `None` means unknown and must be fetched; `Some` means known, even when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedGroup {
    pub org: String,
    /// Team slug, empty for an organization-wide group.
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub repositories: Option<Vec<RepoId>>,
    #[serde(default)]
    pub users: Option<Vec<AccountId>>,
}

impl CachedGroup {
    /// An empty group with both dimensions unknown.
    pub fn new(org: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            team: team.into(),
            repositories: None,
            users: None,
        }
    }

    pub fn is_org(&self) -> bool {
        self.team.is_empty()
    }

    /// Cache key: `version/org[/team]`.
    pub fn key(&self) -> String {
        if self.is_org() {
            format!("{GROUPS_CACHE_VERSION}/{}", self.org)
        } else {
            format!("{GROUPS_CACHE_VERSION}/{}/{}", self.org, self.team)
        }
    }

    /// Append `account` if the member list is partially known and lacks it.
    ///
    /// Returns whether the group changed and needs to be persisted.
    pub fn insert_user_if_partial(&mut self, account: &AccountId) -> bool {
        match &mut self.users {
            Some(users) if !users.is_empty() && !users.contains(account) => {
                users.push(account.clone());
                true
            }
            _ => false,
        }
    }

    /// Append `repo` if the repository list is partially known and lacks it.
    ///
    /// Returns whether the group changed and needs to be persisted.
    pub fn insert_repo_if_partial(&mut self, repo: &RepoId) -> bool {
        match &mut self.repositories {
            Some(repos) if !repos.is_empty() && !repos.contains(repo) => {
                repos.push(repo.clone());
                true
            }
            _ => false,
        }
    }

    /// Members usable as a cache hit for repo-centric lookups.
    pub fn known_users(&self) -> Option<&[AccountId]> {
        self.users.as_deref().filter(|u| !u.is_empty())
    }

    fn reset(&mut self) {
        self.repositories = None;
        self.users = None;
    }
}

/// Group cache for a single provider, keyed under its own namespace.
#[derive(Clone)]
pub struct GroupCache {
    store: Arc<dyn CacheStore>,
    namespace: String,
    ttl: Duration,
}

impl GroupCache {
    pub fn new(store: Arc<dyn CacheStore>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn store_key(&self, group: &CachedGroup) -> String {
        format!("{}:{}", self.namespace, group.key())
    }

    /// Serialize and store `group`, replacing any previous value.
    pub async fn set_group(&self, group: &CachedGroup) -> Result<()> {
        let bytes = serde_json::to_vec(group)?;
        self.store
            .set(&self.store_key(group), bytes, self.ttl)
            .await
    }

    /// Load a group, or an unknown `CachedGroup{org, team}` with `false` on miss.
    pub async fn get_group(&self, org: &str, team: &str) -> (CachedGroup, bool) {
        let empty = CachedGroup::new(org, team);
        let key = self.store_key(&empty);

        let bytes = match self.store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return (empty, false),
            Err(e) => {
                tracing::debug!("groups cache read failed for {key}: {e}");
                return (empty, false);
            }
        };

        match serde_json::from_slice::<CachedGroup>(&bytes) {
            Ok(mut group) => {
                // The key is authoritative for identity.
                group.org = empty.org;
                group.team = empty.team;
                (group, true)
            }
            Err(e) => {
                tracing::debug!("groups cache entry {key} is corrupt: {e}");
                (empty, false)
            }
        }
    }

    /// Drop the stored entry and mark both dimensions of `group` unknown.
    pub async fn invalidate_group(&self, group: &mut CachedGroup) {
        let key = self.store_key(group);
        if let Err(e) = self.store.delete(&key).await {
            tracing::debug!("groups cache delete failed for {key}: {e}");
        }
        group.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (GroupCache, Arc<MemoryCacheStore>) {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = GroupCache::new(store.clone(), "test", Duration::from_secs(3600));
        (cache, store)
    }

    #[test]
    fn test_key_format() {
        assert_eq!(CachedGroup::new("acme", "").key(), "v2/acme");
        assert_eq!(CachedGroup::new("acme", "core").key(), "v2/acme/core");
    }

    #[test]
    fn test_insert_user_only_into_partial_member_list() {
        let me = AccountId::from("1");

        let mut unknown = CachedGroup::new("acme", "");
        assert!(!unknown.insert_user_if_partial(&me));
        assert_eq!(unknown.users, None);

        let mut known_empty = CachedGroup {
            users: Some(vec![]),
            ..CachedGroup::new("acme", "")
        };
        assert!(!known_empty.insert_user_if_partial(&me));
        assert_eq!(known_empty.users, Some(vec![]));

        let mut partial = CachedGroup {
            users: Some(vec![AccountId::from("2")]),
            ..CachedGroup::new("acme", "")
        };
        assert!(partial.insert_user_if_partial(&me));
        assert!(!partial.insert_user_if_partial(&me));
        assert_eq!(partial.users.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_insert_repo_only_into_partial_repository_list() {
        let repo = RepoId::from("R1");

        let mut known_empty = CachedGroup {
            repositories: Some(vec![]),
            ..CachedGroup::new("acme", "core")
        };
        assert!(!known_empty.insert_repo_if_partial(&repo));

        let mut partial = CachedGroup {
            repositories: Some(vec![RepoId::from("R0")]),
            ..CachedGroup::new("acme", "core")
        };
        assert!(partial.insert_repo_if_partial(&repo));
        assert_eq!(
            partial.repositories,
            Some(vec![RepoId::from("R0"), RepoId::from("R1")])
        );
    }

    #[test]
    fn test_known_users_ignores_empty() {
        let mut g = CachedGroup::new("acme", "");
        assert!(g.known_users().is_none());
        g.users = Some(vec![]);
        assert!(g.known_users().is_none());
        g.users = Some(vec![AccountId::from("1")]);
        assert_eq!(g.known_users().map(<[_]>::len), Some(1));
    }

    #[tokio::test]
    async fn test_set_then_get_preserves_empty_versus_unknown() {
        let (cache, _) = cache();
        let group = CachedGroup {
            repositories: Some(vec![]),
            users: None,
            ..CachedGroup::new("acme", "core")
        };
        cache.set_group(&group).await.unwrap();

        let (loaded, ok) = cache.get_group("acme", "core").await;
        assert!(ok);
        assert_eq!(loaded.repositories, Some(vec![]));
        assert_eq!(loaded.users, None);
    }

    #[tokio::test]
    async fn test_get_missing_returns_unknown_group() {
        let (cache, _) = cache();
        let (group, ok) = cache.get_group("acme", "").await;
        assert!(!ok);
        assert_eq!(group, CachedGroup::new("acme", ""));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let (cache, store) = cache();
        store
            .set("test:v2/acme", b"{not json".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let (group, ok) = cache.get_group("acme", "").await;
        assert!(!ok);
        assert_eq!(group.repositories, None);
    }

    #[tokio::test]
    async fn test_invalidate_deletes_and_resets() {
        let (cache, store) = cache();
        let mut group = CachedGroup {
            repositories: Some(vec![RepoId::from("R1")]),
            users: Some(vec![AccountId::from("1")]),
            ..CachedGroup::new("acme", "")
        };
        cache.set_group(&group).await.unwrap();

        cache.invalidate_group(&mut group).await;
        assert_eq!(group.repositories, None);
        assert_eq!(group.users, None);
        assert!(store.get("test:v2/acme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_namespaces_do_not_collide() {
        let store = Arc::new(MemoryCacheStore::new());
        let a = GroupCache::new(store.clone(), "a", Duration::from_secs(60));
        let b = GroupCache::new(store, "b", Duration::from_secs(60));

        let group = CachedGroup {
            users: Some(vec![AccountId::from("1")]),
            ..CachedGroup::new("acme", "")
        };
        a.set_group(&group).await.unwrap();

        assert!(a.get_group("acme", "").await.1);
        assert!(!b.get_group("acme", "").await.1);
    }
}
