use std::collections::HashSet;

use super::{
    Deduped, ExternalRepo, FetchError, FetchPermsOptions, PermissionProvider, ProviderError,
    drain_group_pages,
};
use crate::codehost::{
    AccountId, ClientError, CodeHostClient, CollaboratorAffiliation, OrgDetails, RepoVisibility,
};

/// A group whose members can read a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RepoGroup {
    pub org: String,
    /// Team slug, empty for the organization itself.
    pub team: String,
    /// List only organization admins instead of every member.
    pub admins_only: bool,
    /// Whether the member list may be read from and written to the groups cache.
    pub cacheable: bool,
}

type RepoPermsResult = Result<Vec<AccountId>, FetchError<Vec<AccountId>>>;

fn partial(users: &Deduped<AccountId>, error: ProviderError) -> FetchError<Vec<AccountId>> {
    FetchError::with_partial(users.to_vec(), error)
}

/// Split `host/owner/name` into `(owner, name)`.
pub(crate) fn split_name_with_owner<'a>(
    uri: &'a str,
    hostname: &str,
) -> Result<(&'a str, &'a str), ProviderError> {
    let name_with_owner = uri
        .strip_prefix(hostname)
        .unwrap_or(uri)
        .trim_start_matches('/');
    match name_with_owner.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(ProviderError::InvalidRepoName(uri.to_string())),
    }
}

impl PermissionProvider {
    /// List the code host accounts that can read `repo`.
    ///
    /// Direct collaborators come first, followed by members of the groups
    /// granting access. On a code host failure the returned [`FetchError`]
    /// carries the accounts gathered before the failure.
    pub async fn fetch_repo_perms(
        &self,
        repo: Option<&ExternalRepo>,
        opts: FetchPermsOptions,
    ) -> RepoPermsResult {
        let repo = repo.ok_or_else(|| FetchError::precondition(ProviderError::NoRepository))?;
        if repo.service_type != self.code_host.service_type
            || repo.service_id != self.code_host.service_id
        {
            return Err(FetchError::precondition(ProviderError::RepoHostMismatch {
                want: repo.service_id.clone(),
                have: self.code_host.service_id.clone(),
            }));
        }
        let (owner, name) = split_name_with_owner(&repo.uri, self.code_host.hostname())
            .map_err(FetchError::precondition)?;

        let client = self.client.as_ref();
        let affiliation = self
            .groups_cache
            .as_ref()
            .map(|_| CollaboratorAffiliation::Direct);

        let mut users = Deduped::default();
        let mut page = 1;
        loop {
            match client
                .list_repository_collaborators(owner, name, page, affiliation)
                .await
            {
                Ok(p) => {
                    users.extend(p.items.iter().map(|c| c.account_id()));
                    if !p.has_next_page {
                        break;
                    }
                    page += 1;
                }
                Err(e) => {
                    return Err(partial(
                        &users,
                        ProviderError::client("list users for repo", e),
                    ));
                }
            }
        }

        let Some(cache) = &self.groups_cache else {
            return Ok(users.into_vec());
        };

        let org = match client.get_organization(owner).await {
            Ok(org) => org,
            Err(e) if e.is_not_found() => {
                tracing::debug!(repo = %repo.uri, "owner is not an organization");
                return Ok(users.into_vec());
            }
            Err(e) => {
                return Err(partial(
                    &users,
                    ProviderError::client("get groups affiliated with repo", e),
                ));
            }
        };

        let groups = match self.repo_groups(client, &org, owner, name).await {
            Ok(groups) => groups,
            Err(e) => {
                return Err(partial(
                    &users,
                    ProviderError::client("get groups affiliated with repo", e),
                ));
            }
        };

        for target in &groups {
            let mut group = None;
            if target.cacheable {
                let mut cached =
                    Self::load_group(cache, &target.org, &target.team, opts.invalidate_caches)
                        .await;
                if cached.insert_repo_if_partial(&repo.external_id) {
                    Self::store_group(cache, &cached).await;
                }
                if let Some(known) = cached.known_users() {
                    users.extend(known.iter().cloned());
                    continue;
                }
                group = Some(cached);
            }

            let (org, team) = (target.org.as_str(), target.team.as_str());
            let listing = if team.is_empty() {
                let admins_only = target.admins_only;
                drain_group_pages(move |page| {
                    client.list_organization_members(org, page, admins_only)
                })
                .await
            } else {
                drain_group_pages(move |page| client.list_team_members(org, team, page)).await
            };

            let members: Vec<AccountId> = listing.items.iter().map(|c| c.account_id()).collect();
            users.extend(members.iter().cloned());
            if let Some(e) = listing.error {
                return Err(partial(
                    &users,
                    ProviderError::client("list users for group", e),
                ));
            }

            if let Some(mut group) = group {
                group.users = Some(members);
                Self::store_group(cache, &group).await;
            }
        }

        Ok(users.into_vec())
    }

    /// Groups granting read access to `owner/name`.
    ///
    /// When every member can read the repository, that is the whole
    /// organization. Otherwise it is the organization admins plus every team
    /// the repository is shared with.
    async fn repo_groups(
        &self,
        client: &dyn CodeHostClient,
        org: &OrgDetails,
        owner: &str,
        name: &str,
    ) -> Result<Vec<RepoGroup>, ClientError> {
        let all_members_read = org.grants_members_read();

        let mut internal = false;
        if self.enable_internal_repo_visibility && !all_members_read {
            let r = client.get_repository(owner, name).await?;
            internal = r.visibility == Some(RepoVisibility::Internal);
        }

        if all_members_read || internal {
            // The organization entry must only ever hold users who can read
            // every repository, which internal visibility does not imply.
            return Ok(vec![RepoGroup {
                org: owner.to_string(),
                team: String::new(),
                admins_only: false,
                cacheable: all_members_read,
            }]);
        }

        let mut groups = vec![RepoGroup {
            org: owner.to_string(),
            team: String::new(),
            admins_only: true,
            cacheable: true,
        }];
        let mut seen = HashSet::new();
        let mut page = 1;
        loop {
            let p = client.list_repository_teams(owner, name, page).await?;
            for team in p.items {
                if seen.insert(team.slug.clone()) {
                    groups.push(RepoGroup {
                        org: owner.to_string(),
                        team: team.slug,
                        admins_only: false,
                        cacheable: true,
                    });
                }
            }
            if !p.has_next_page {
                break;
            }
            page += 1;
        }

        Ok(groups)
    }
}
