use std::collections::HashSet;

use super::{
    Account, Deduped, ExternalUserPermissions, FetchError, FetchPermsOptions, PermissionProvider,
    ProviderError, drain_group_pages,
};
use crate::codehost::{
    ClientError, CodeHostClient, MAX_PER_PAGE, RepoId, RepositoryAffiliation, Visibility,
};

/// Affiliations listed directly when organization and team access comes from
/// the groups cache instead.
const DIRECT_AFFILIATIONS: &[RepositoryAffiliation] = &[
    RepositoryAffiliation::Owner,
    RepositoryAffiliation::Collaborator,
];

/// An organization (`team` empty) or team through which a user may gain access.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct GroupRef {
    pub org: String,
    pub team: String,
}

type UserPermsResult = Result<ExternalUserPermissions, FetchError<ExternalUserPermissions>>;

fn partial(perms: &Deduped<RepoId>, error: ProviderError) -> FetchError<ExternalUserPermissions> {
    FetchError::with_partial(
        ExternalUserPermissions {
            exacts: perms.to_vec(),
        },
        error,
    )
}

impl PermissionProvider {
    /// List every repository `account` can access on this code host.
    ///
    /// On a code host failure the returned [`FetchError`] carries the
    /// repositories gathered before the failure.
    pub async fn fetch_user_perms(
        &self,
        account: Option<&Account>,
        opts: FetchPermsOptions,
    ) -> UserPermsResult {
        let account =
            account.ok_or_else(|| FetchError::precondition(ProviderError::NoAccount))?;
        if account.service_type != self.code_host.service_type
            || account.service_id != self.code_host.service_id
        {
            return Err(FetchError::precondition(
                ProviderError::AccountHostMismatch {
                    want: account.service_id.clone(),
                    have: self.code_host.service_id.clone(),
                },
            ));
        }
        let token = account
            .data
            .token
            .as_ref()
            .ok_or_else(|| FetchError::precondition(ProviderError::NoToken))?;

        let client = self
            .client
            .with_authenticator(self.bearer_token(account, token));
        let client = client.as_ref();

        let affiliations: &[RepositoryAffiliation] = if self.groups_cache.is_some() {
            DIRECT_AFFILIATIONS
        } else {
            &[]
        };

        let mut perms = Deduped::default();
        let mut page = 1;
        loop {
            match client
                .list_affiliated_repositories(Visibility::Private, page, MAX_PER_PAGE, affiliations)
                .await
            {
                Ok(p) => {
                    perms.extend(p.items.into_iter().map(|r| r.id));
                    if !p.has_next_page {
                        break;
                    }
                    page += 1;
                }
                Err(e) => {
                    return Err(partial(
                        &perms,
                        ProviderError::client("list repos for user", e),
                    ));
                }
            }
        }

        let Some(cache) = &self.groups_cache else {
            return Ok(ExternalUserPermissions {
                exacts: perms.into_vec(),
            });
        };
        if account.account_id.as_str().is_empty() {
            tracing::debug!(
                user_id = account.user_id,
                "account has no stable ID, skipping group permissions"
            );
            return Ok(ExternalUserPermissions {
                exacts: perms.into_vec(),
            });
        }

        let groups = match affiliated_groups(client).await {
            Ok(groups) => groups,
            Err(e) => {
                return Err(partial(
                    &perms,
                    ProviderError::client("get groups affiliated with user", e),
                ));
            }
        };
        tracing::debug!(
            user_id = account.user_id,
            groups = groups.len(),
            "resolving group permissions"
        );

        for GroupRef { org, team } in &groups {
            let mut group = Self::load_group(cache, org, team, opts.invalidate_caches).await;

            if group.insert_user_if_partial(&account.account_id) {
                Self::store_group(cache, &group).await;
            }

            if let Some(repos) = &group.repositories {
                perms.extend(repos.iter().cloned());
                continue;
            }

            let listing = if team.is_empty() {
                drain_group_pages(move |page| client.list_org_repositories(org, page, "")).await
            } else {
                drain_group_pages(move |page| client.list_team_repositories(org, team, page))
                    .await
            };

            let repos: Vec<RepoId> = listing.items.into_iter().map(|r| r.id).collect();
            perms.extend(repos.iter().cloned());
            if let Some(e) = listing.error {
                return Err(partial(
                    &perms,
                    ProviderError::client("list repos for group", e),
                ));
            }

            group.repositories = Some(repos);
            Self::store_group(cache, &group).await;
        }

        Ok(ExternalUserPermissions {
            exacts: perms.into_vec(),
        })
    }
}

/// Organizations whose every repository the user can see, then teams with
/// repositories outside those organizations.
async fn affiliated_groups(client: &dyn CodeHostClient) -> Result<Vec<GroupRef>, ClientError> {
    let mut groups = Vec::new();
    let mut seen = HashSet::new();

    let mut page = 1;
    loop {
        let p = client
            .get_authenticated_user_orgs_details_and_membership(page)
            .await?;
        for org in &p.items {
            if !org.can_view_all_repos() {
                continue;
            }
            if let Some(login) = org.login() {
                let group = GroupRef {
                    org: login.to_string(),
                    team: String::new(),
                };
                if seen.insert(group.clone()) {
                    groups.push(group);
                }
            }
        }
        if !p.has_next_page {
            break;
        }
        page += 1;
    }

    let candidate_orgs: HashSet<String> = groups.iter().map(|g| g.org.clone()).collect();

    let mut page = 1;
    loop {
        let p = client.get_authenticated_user_teams(page).await?;
        for team in p.items {
            if team.repos_count == 0 {
                continue;
            }
            let Some(org) = team.organization else {
                continue;
            };
            if candidate_orgs.contains(&org.login) {
                continue;
            }
            let group = GroupRef {
                org: org.login,
                team: team.slug,
            };
            if seen.insert(group.clone()) {
                groups.push(group);
            }
        }
        if !p.has_next_page {
            break;
        }
        page += 1;
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::codehost::AccountId;
    use crate::groups_cache::CachedGroup;
    use crate::provider::fake::{FakeClient, org_membership, team};
    use crate::provider::{AccountData, AccountToken, CodeHost, ProviderOptions};

    fn provider(client: &FakeClient, ttl_hours: i64) -> PermissionProvider {
        let host = CodeHost::github("https://github.com").unwrap();
        PermissionProvider::new(
            host,
            Arc::new(client.clone()),
            ProviderOptions {
                groups_cache_ttl_hours: ttl_hours,
                ..Default::default()
            },
        )
    }

    fn account(account_id: &str) -> Account {
        Account {
            user_id: 1,
            service_type: "github".to_string(),
            service_id: "https://github.com/".to_string(),
            account_id: AccountId::from(account_id),
            data: AccountData {
                token: Some(AccountToken {
                    access_token: "user-token".to_string(),
                    refresh_token: None,
                    expiry: None,
                }),
                installation_id: None,
            },
        }
    }

    fn ids(perms: &ExternalUserPermissions) -> Vec<&str> {
        perms.exacts.iter().map(RepoId::as_str).collect()
    }

    /// Affiliated repos over two pages, an org readable by all members, an org
    /// the user administers, and a team in an org that grants nothing.
    fn scenario() -> FakeClient {
        FakeClient::new()
            .repos("affiliated", vec![vec!["R1", "R2"], vec!["R3"]])
            .orgs(vec![vec![
                org_membership("read-org", "read", "member"),
                org_membership("admin-org", "none", "admin"),
                org_membership("closed-org", "none", "member"),
            ]])
            .teams(
                "user_teams",
                vec![vec![
                    team("read-org", "t1", 3),
                    team("closed-org", "empty", 0),
                    team("closed-org", "core", 2),
                ]],
            )
            .repos("org:read-org", vec![vec!["O1"], vec!["O2"]])
            .repos("org:admin-org", vec![vec!["A1"]])
            .repos("team:closed-org/core", vec![vec!["R1", "T1"]])
    }

    #[tokio::test]
    async fn test_preconditions() {
        let p = provider(&FakeClient::new(), 0);

        let err = p
            .fetch_user_perms(None, FetchPermsOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no account provided");
        assert!(err.partial.is_none());

        let mut gitlab = account("1234");
        gitlab.service_type = "gitlab".to_string();
        gitlab.service_id = "https://gitlab.com/".to_string();
        let err = p
            .fetch_user_perms(Some(&gitlab), FetchPermsOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"not a code host of the account: want "https://gitlab.com/" but have "https://github.com/""#
        );

        let mut tokenless = account("1234");
        tokenless.data.token = None;
        let err = p
            .fetch_user_perms(Some(&tokenless), FetchPermsOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no token found in the external account data");
        assert!(err.partial.is_none());
    }

    #[tokio::test]
    async fn test_cache_disabled_lists_all_affiliations_only() {
        let client = scenario();
        let p = provider(&client, -1);

        let perms = p
            .fetch_user_perms(Some(&account("1234")), FetchPermsOptions::default())
            .await
            .unwrap();

        assert_eq!(ids(&perms), vec!["R1", "R2", "R3"]);
        assert!(client.state().affiliations.iter().all(Vec::is_empty));
        assert_eq!(client.calls("orgs"), 0);
        assert_eq!(client.state().tokens, vec!["user-token".to_string()]);
    }

    #[tokio::test]
    async fn test_groups_merge_and_dedupe() {
        let client = scenario();
        let p = provider(&client, 0);

        let perms = p
            .fetch_user_perms(Some(&account("1234")), FetchPermsOptions::default())
            .await
            .unwrap();

        assert_eq!(ids(&perms), vec!["R1", "R2", "R3", "O1", "O2", "A1", "T1"]);
        assert_eq!(
            client.state().affiliations[0],
            vec![
                RepositoryAffiliation::Owner,
                RepositoryAffiliation::Collaborator
            ]
        );
        // Teams of a candidate org and teams without repositories are skipped.
        assert_eq!(client.calls("team:read-org"), 0);
        assert_eq!(client.calls("team:closed-org/empty"), 0);
        assert_eq!(client.calls("org:closed-org"), 0);
    }

    #[tokio::test]
    async fn test_cached_resync_and_invalidation() {
        let client = scenario();
        let p = provider(&client, 0);
        let me = account("1234");

        let first = p
            .fetch_user_perms(Some(&me), FetchPermsOptions::default())
            .await
            .unwrap();

        client.reset_calls();
        let second = p
            .fetch_user_perms(Some(&me), FetchPermsOptions::default())
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(client.calls("org:"), 0);
        assert_eq!(client.calls("team:"), 0);

        client.reset_calls();
        let third = p
            .fetch_user_perms(
                Some(&me),
                FetchPermsOptions {
                    invalidate_caches: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(first, third);
        assert_eq!(client.calls("org:"), 3);
        assert_eq!(client.calls("team:"), 1);
    }

    #[tokio::test]
    async fn test_account_without_stable_id_skips_groups() {
        let client = scenario();
        let p = provider(&client, 0);

        let perms = p
            .fetch_user_perms(Some(&account("")), FetchPermsOptions::default())
            .await
            .unwrap();

        assert_eq!(ids(&perms), vec!["R1", "R2", "R3"]);
        assert_eq!(client.calls("orgs"), 0);
    }

    #[tokio::test]
    async fn test_forbidden_group_listing_is_persisted() {
        for status in [403, 404] {
            let client = scenario().fail("team:closed-org/core", 1, status);
            let p = provider(&client, 0);

            let perms = p
                .fetch_user_perms(Some(&account("1234")), FetchPermsOptions::default())
                .await
                .unwrap();
            assert_eq!(ids(&perms), vec!["R1", "R2", "R3", "O1", "O2", "A1"]);

            let cache = p.groups_cache.as_ref().unwrap();
            let (group, found) = cache.get_group("closed-org", "core").await;
            assert!(found, "status {status}");
            assert_eq!(group.repositories, Some(vec![]));
        }
    }

    #[tokio::test]
    async fn test_group_error_returns_partial_without_persisting() {
        let client = scenario().fail("org:read-org", 2, 502);
        let p = provider(&client, 0);

        let err = p
            .fetch_user_perms(Some(&account("1234")), FetchPermsOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("list repos for group: "));
        let partial = err.partial.unwrap();
        assert_eq!(ids(&partial), vec!["R1", "R2", "R3", "O1"]);

        let cache = p.groups_cache.as_ref().unwrap();
        assert!(!cache.get_group("read-org", "").await.1);
    }

    #[tokio::test]
    async fn test_affiliated_listing_error_returns_partial() {
        let client = scenario().fail("affiliated", 2, 500);
        let p = provider(&client, 0);

        let err = p
            .fetch_user_perms(Some(&account("1234")), FetchPermsOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("list repos for user: "));
        assert_eq!(ids(&err.partial.unwrap()), vec!["R1", "R2"]);
    }

    #[tokio::test]
    async fn test_group_discovery_error_is_wrapped() {
        let client = scenario().fail("user_teams", 1, 500);
        let p = provider(&client, 0);

        let err = p
            .fetch_user_perms(Some(&account("1234")), FetchPermsOptions::default())
            .await
            .unwrap_err();
        assert!(
            err.to_string()
                .starts_with("get groups affiliated with user: ")
        );
        assert_eq!(ids(&err.partial.unwrap()), vec!["R1", "R2", "R3"]);
    }

    #[tokio::test]
    async fn test_partial_cache_completion() {
        let client = scenario();
        let p = provider(&client, 0);
        let cache = p.groups_cache.as_ref().unwrap();

        // Learned by a repo-centric sync: members known, repositories empty.
        cache
            .set_group(&CachedGroup {
                users: Some(vec![AccountId::from("9")]),
                repositories: Some(vec![]),
                ..CachedGroup::new("read-org", "")
            })
            .await
            .unwrap();
        // Learned by a user-centric sync: repositories known, no members.
        cache
            .set_group(&CachedGroup {
                users: Some(vec![]),
                repositories: Some(vec![RepoId::from("R9")]),
                ..CachedGroup::new("closed-org", "core")
            })
            .await
            .unwrap();

        let perms = p
            .fetch_user_perms(Some(&account("1234")), FetchPermsOptions::default())
            .await
            .unwrap();
        assert_eq!(ids(&perms), vec!["R1", "R2", "R3", "A1", "R9"]);

        let (org, _) = cache.get_group("read-org", "").await;
        assert_eq!(
            org.users,
            Some(vec![AccountId::from("9"), AccountId::from("1234")])
        );
        let (core, _) = cache.get_group("closed-org", "core").await;
        assert_eq!(core.users, Some(vec![]));
        assert_eq!(client.calls("team:"), 0);
    }

    #[tokio::test]
    async fn test_same_team_slug_in_two_orgs_is_synced_twice() {
        let client = FakeClient::new()
            .teams(
                "user_teams",
                vec![vec![team("org-a", "core", 1), team("org-b", "core", 1)]],
            )
            .repos("team:org-a/core", vec![vec!["A"]])
            .repos("team:org-b/core", vec![vec!["B"]]);
        let p = provider(&client, 0);

        let perms = p
            .fetch_user_perms(Some(&account("1234")), FetchPermsOptions::default())
            .await
            .unwrap();

        assert_eq!(ids(&perms), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_refresher_attached_for_app_installations() {
        use crate::codehost::{OAuthBearerToken, RefreshedToken, TokenRefresher};

        struct NoopRefresher;

        #[async_trait::async_trait]
        impl TokenRefresher for NoopRefresher {
            async fn refresh(
                &self,
                token: &OAuthBearerToken,
            ) -> crate::codehost::Result<RefreshedToken> {
                Ok(RefreshedToken {
                    access_token: token.access_token.clone(),
                    refresh_token: None,
                    expiry: None,
                })
            }
        }

        let client = FakeClient::new();
        let p = PermissionProvider::new(
            CodeHost::github("https://github.com").unwrap(),
            Arc::new(client.clone()),
            ProviderOptions {
                groups_cache_ttl_hours: -1,
                token_refresher: Some(Arc::new(NoopRefresher)),
                ..Default::default()
            },
        );

        let plain = account("1");
        let mut installed = account("2");
        installed.data.installation_id = Some(77);

        p.fetch_user_perms(Some(&plain), FetchPermsOptions::default())
            .await
            .unwrap();
        p.fetch_user_perms(Some(&installed), FetchPermsOptions::default())
            .await
            .unwrap();

        assert_eq!(client.state().refreshable, vec![false, true]);
    }
}
