//! Permission provider for GitHub code hosts.
//!
//! [`PermissionProvider`] answers two questions against a [`CodeHostClient`]:
//! which repositories can an account see ([`PermissionProvider::fetch_user_perms`])
//! and which accounts can see a repository
//! ([`PermissionProvider::fetch_repo_perms`]). Access granted through
//! organizations and teams is memoized in a [`GroupCache`] shared by both
//! directions, so a user-centric sync can reuse members learned by a
//! repo-centric one and vice versa.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use permsync::provider::{CodeHost, FetchPermsOptions, PermissionProvider, ProviderOptions};
//!
//! let host = CodeHost::github("https://github.com")?;
//! let provider = PermissionProvider::new(host, client, ProviderOptions::default());
//! let perms = provider
//!     .fetch_user_perms(Some(&account), FetchPermsOptions::default())
//!     .await?;
//! println!("{} repositories", perms.exacts.len());
//! ```

mod errors;
#[cfg(test)]
pub(crate) mod fake;
mod repo_perms;
mod types;
mod user_perms;
mod validate;

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::codehost::{
    ClientError, CodeHostClient, OAuthBearerToken, Page, TokenRefresher,
};
use crate::groups_cache::{CacheStore, CachedGroup, GroupCache, MemoryCacheStore};

pub use errors::{FetchError, ProviderError};
pub use types::{
    Account, AccountData, AccountToken, CodeHost, ExternalRepo, ExternalUserPermissions,
    FetchPermsOptions, GITHUB_SERVICE_TYPE,
};

/// Groups cache TTL used when the configured value is zero.
pub const DEFAULT_GROUPS_CACHE_TTL_HOURS: u64 = 72;

/// Resolve the configured groups cache TTL.
///
/// Negative hours disable the cache, zero selects the default.
pub fn groups_cache_ttl(hours: i64) -> Option<Duration> {
    match hours {
        h if h < 0 => None,
        0 => Some(Duration::from_secs(DEFAULT_GROUPS_CACHE_TTL_HOURS * 3600)),
        h => Some(Duration::from_secs(h.unsigned_abs() * 3600)),
    }
}

/// Construction options for [`PermissionProvider`].
#[derive(Clone, Default)]
pub struct ProviderOptions {
    /// Hours group facts stay cached. Negative disables caching, 0 means 72.
    pub groups_cache_ttl_hours: i64,
    /// Backing store for the groups cache. Defaults to an in-process store.
    pub cache_store: Option<Arc<dyn CacheStore>>,
    /// Treat `internal` repositories as readable by every organization member.
    pub enable_internal_repo_visibility: bool,
    /// Attached to account tokens that can be refreshed.
    pub token_refresher: Option<Arc<dyn TokenRefresher>>,
}

impl fmt::Debug for ProviderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderOptions")
            .field("groups_cache_ttl_hours", &self.groups_cache_ttl_hours)
            .field("has_cache_store", &self.cache_store.is_some())
            .field(
                "enable_internal_repo_visibility",
                &self.enable_internal_repo_visibility,
            )
            .field("has_token_refresher", &self.token_refresher.is_some())
            .finish()
    }
}

/// Resolves repository permissions for one GitHub code host.
#[derive(Clone)]
pub struct PermissionProvider {
    code_host: CodeHost,
    client: Arc<dyn CodeHostClient>,
    groups_cache: Option<GroupCache>,
    enable_internal_repo_visibility: bool,
    token_refresher: Option<Arc<dyn TokenRefresher>>,
}

impl PermissionProvider {
    /// Create a provider. `client` authenticates with the site credential and is
    /// used for repo-centric lookups and connection validation.
    pub fn new(
        code_host: CodeHost,
        client: Arc<dyn CodeHostClient>,
        opts: ProviderOptions,
    ) -> Self {
        let groups_cache = groups_cache_ttl(opts.groups_cache_ttl_hours).map(|ttl| {
            let store = opts
                .cache_store
                .unwrap_or_else(|| Arc::new(MemoryCacheStore::new()));
            let namespace = format!("github_groups_perms:{}", code_host.hostname());
            GroupCache::new(store, namespace, ttl)
        });
        if groups_cache.is_none() {
            tracing::debug!(host = %code_host.service_id, "groups cache disabled");
        }

        Self {
            code_host,
            client,
            groups_cache,
            enable_internal_repo_visibility: opts.enable_internal_repo_visibility,
            token_refresher: opts.token_refresher,
        }
    }

    pub fn code_host(&self) -> &CodeHost {
        &self.code_host
    }

    pub fn service_id(&self) -> &str {
        &self.code_host.service_id
    }

    pub fn groups_cache_enabled(&self) -> bool {
        self.groups_cache.is_some()
    }

    /// Bearer token for an account, refreshable when the account allows it.
    fn bearer_token(&self, account: &Account, token: &AccountToken) -> OAuthBearerToken {
        let mut bearer = OAuthBearerToken::new(token.access_token.clone())
            .with_refresh_token(token.refresh_token.clone())
            .with_expiry(token.expiry);
        let refreshable =
            account.data.installation_id.is_some() || token.refresh_token.is_some();
        if refreshable && let Some(refresher) = &self.token_refresher {
            bearer = bearer.with_refresher(refresher.clone());
        }
        bearer
    }

    /// Load a group, dropping it first when the caller asked to invalidate.
    async fn load_group(
        cache: &GroupCache,
        org: &str,
        team: &str,
        invalidate: bool,
    ) -> CachedGroup {
        let (mut group, found) = cache.get_group(org, team).await;
        if found && invalidate {
            cache.invalidate_group(&mut group).await;
        }
        group
    }

    /// Persist a group. Failures are logged and otherwise ignored.
    async fn store_group(cache: &GroupCache, group: &CachedGroup) {
        if let Err(e) = cache.set_group(group).await {
            tracing::warn!(key = %group.key(), "failed to store group permissions: {e}");
        }
    }
}

/// Order-stable set used to merge permissions from several sources.
#[derive(Debug)]
pub(crate) struct Deduped<T> {
    items: Vec<T>,
    seen: HashSet<T>,
}

impl<T> Default for Deduped<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> Deduped<T> {
    pub(crate) fn push(&mut self, item: T) {
        if self.seen.insert(item.clone()) {
            self.items.push(item);
        }
    }

    pub(crate) fn into_vec(self) -> Vec<T> {
        self.items
    }

    pub(crate) fn to_vec(&self) -> Vec<T> {
        self.items.clone()
    }
}

impl<T: Clone + Eq + Hash> Extend<T> for Deduped<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

/// Outcome of draining every page of a group listing.
pub(crate) struct GroupListing<T> {
    pub items: Vec<T>,
    /// Non-access error that stopped pagination early.
    pub error: Option<ClientError>,
}

/// Drain a group listing page by page.
///
/// A 403 or 404 ends pagination as if the last page had been reached; any
/// other error is returned alongside the items collected so far.
pub(crate) async fn drain_group_pages<T, F, Fut>(mut fetch: F) -> GroupListing<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = crate::codehost::Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        match fetch(page).await {
            Ok(p) => {
                items.extend(p.items);
                if !p.has_next_page {
                    return GroupListing { items, error: None };
                }
                page += 1;
            }
            Err(e) if e.is_forbidden() || e.is_not_found() => {
                tracing::debug!("group listing ended early: {e}");
                return GroupListing { items, error: None };
            }
            Err(e) => {
                return GroupListing {
                    items,
                    error: Some(e),
                };
            }
        }
    }
}
