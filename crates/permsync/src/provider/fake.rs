//! Scriptable in-memory [`CodeHostClient`] for provider tests.
//!
//! Every listing is keyed by a string naming the endpoint and its arguments
//! (`org:acme`, `team:acme/core`, `collaborators:acme/api`, ...). Calls are
//! recorded as `key#page`, and a failure can be injected for any `key#page`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::codehost::{
    ClientError, CodeHostClient, Collaborator, CollaboratorAffiliation, OAuthBearerToken,
    OrgDetails, OrgDetailsAndMembership, OrgMembership, OrgRef, Page, RepoId, RepoVisibility,
    Repository, RepositoryAffiliation, Result, Team, Visibility,
};

#[derive(Default)]
pub(crate) struct FakeState {
    repos: HashMap<String, Vec<Vec<Repository>>>,
    users: HashMap<String, Vec<Vec<Collaborator>>>,
    teams: HashMap<String, Vec<Vec<Team>>>,
    orgs: Vec<Vec<OrgDetailsAndMembership>>,
    org_details: HashMap<String, OrgDetails>,
    repositories: HashMap<String, Repository>,
    scopes: Option<std::result::Result<Vec<String>, u16>>,
    failures: HashMap<String, u16>,
    pub calls: Vec<String>,
    pub affiliations: Vec<Vec<RepositoryAffiliation>>,
    pub collaborator_affiliations: Vec<Option<CollaboratorAffiliation>>,
    pub tokens: Vec<String>,
    /// Whether each authenticated token carried a refresh callback.
    pub refreshable: Vec<bool>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeClient {
    state: Arc<Mutex<FakeState>>,
}

pub(crate) fn repo(id: &str) -> Repository {
    Repository {
        id: RepoId::from(id),
        database_id: 0,
        full_name: String::new(),
        private: true,
        visibility: None,
    }
}

pub(crate) fn user(id: i64) -> Collaborator {
    Collaborator {
        database_id: id,
        login: format!("user{id}"),
    }
}

pub(crate) fn team(org: &str, slug: &str, repos_count: i64) -> Team {
    Team {
        slug: slug.to_string(),
        name: slug.to_string(),
        repos_count,
        organization: Some(OrgRef {
            login: org.to_string(),
        }),
    }
}

pub(crate) fn org_details(login: &str, default_permission: &str) -> OrgDetails {
    OrgDetails {
        login: login.to_string(),
        default_repository_permission: Some(default_permission.to_string()),
    }
}

/// An organization the authenticated user belongs to with `role`.
pub(crate) fn org_membership(
    login: &str,
    default_permission: &str,
    role: &str,
) -> OrgDetailsAndMembership {
    OrgDetailsAndMembership {
        details: Some(org_details(login, default_permission)),
        membership: Some(OrgMembership {
            state: "active".to_string(),
            role: role.to_string(),
        }),
    }
}

impl FakeClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn repos(self, key: &str, pages: Vec<Vec<&str>>) -> Self {
        let pages = pages
            .into_iter()
            .map(|p| p.into_iter().map(repo).collect())
            .collect();
        self.state().repos.insert(key.to_string(), pages);
        self
    }

    pub(crate) fn users(self, key: &str, pages: Vec<Vec<i64>>) -> Self {
        let pages = pages
            .into_iter()
            .map(|p| p.into_iter().map(user).collect())
            .collect();
        self.state().users.insert(key.to_string(), pages);
        self
    }

    pub(crate) fn teams(self, key: &str, pages: Vec<Vec<Team>>) -> Self {
        self.state().teams.insert(key.to_string(), pages);
        self
    }

    pub(crate) fn orgs(self, pages: Vec<Vec<OrgDetailsAndMembership>>) -> Self {
        self.state().orgs = pages;
        self
    }

    /// Register an organization; logins without one answer 404.
    pub(crate) fn org(self, login: &str, default_permission: &str) -> Self {
        self.state()
            .org_details
            .insert(login.to_string(), org_details(login, default_permission));
        self
    }

    pub(crate) fn repository(self, full_name: &str, visibility: RepoVisibility) -> Self {
        let mut r = repo(&format!("R-{full_name}"));
        r.full_name = full_name.to_string();
        r.visibility = Some(visibility);
        self.state().repositories.insert(full_name.to_string(), r);
        self
    }

    pub(crate) fn scopes(self, scopes: &[&str]) -> Self {
        self.state().scopes = Some(Ok(scopes.iter().map(|s| s.to_string()).collect()));
        self
    }

    pub(crate) fn scopes_error(self, status: u16) -> Self {
        self.state().scopes = Some(Err(status));
        self
    }

    /// Make the call `key#page` fail with `status`.
    pub(crate) fn fail(self, key: &str, page: u32, status: u16) -> Self {
        self.state().failures.insert(format!("{key}#{page}"), status);
        self
    }

    /// Number of recorded calls whose key starts with `prefix`.
    pub(crate) fn calls(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub(crate) fn reset_calls(&self) {
        self.state().calls.clear();
    }

    fn record(&self, key: &str, page: u32) -> Result<()> {
        let call = format!("{key}#{page}");
        let mut state = self.state();
        state.calls.push(call.clone());
        match state.failures.get(&call) {
            Some(&status) => Err(ClientError::http(status, call, "injected failure")),
            None => Ok(()),
        }
    }

    fn page<T: Clone>(pages: Option<&Vec<Vec<T>>>, page: u32) -> Page<T> {
        let pages = pages.map(Vec::as_slice).unwrap_or_default();
        let idx = page.saturating_sub(1) as usize;
        let items = pages.get(idx).cloned().unwrap_or_default();
        Page::new(items, idx + 1 < pages.len(), 1)
    }

    fn repo_page(&self, key: &str, page: u32) -> Result<Page<Repository>> {
        self.record(key, page)?;
        Ok(Self::page(self.state().repos.get(key), page))
    }

    fn user_page(&self, key: &str, page: u32) -> Result<Page<Collaborator>> {
        self.record(key, page)?;
        Ok(Self::page(self.state().users.get(key), page))
    }

    fn team_page(&self, key: &str, page: u32) -> Result<Page<Team>> {
        self.record(key, page)?;
        Ok(Self::page(self.state().teams.get(key), page))
    }
}

#[async_trait]
impl CodeHostClient for FakeClient {
    fn with_authenticator(&self, token: OAuthBearerToken) -> Arc<dyn CodeHostClient> {
        let mut state = self.state();
        state.tokens.push(token.access_token.clone());
        state.refreshable.push(token.has_refresher());
        drop(state);
        Arc::new(self.clone())
    }

    async fn list_affiliated_repositories(
        &self,
        _visibility: Visibility,
        page: u32,
        _per_page: u32,
        affiliations: &[RepositoryAffiliation],
    ) -> Result<Page<Repository>> {
        self.state().affiliations.push(affiliations.to_vec());
        self.repo_page("affiliated", page)
    }

    async fn list_org_repositories(
        &self,
        org: &str,
        page: u32,
        _repo_type: &str,
    ) -> Result<Page<Repository>> {
        self.repo_page(&format!("org:{org}"), page)
    }

    async fn list_team_repositories(
        &self,
        org: &str,
        team: &str,
        page: u32,
    ) -> Result<Page<Repository>> {
        self.repo_page(&format!("team:{org}/{team}"), page)
    }

    async fn list_repository_collaborators(
        &self,
        owner: &str,
        name: &str,
        page: u32,
        affiliation: Option<CollaboratorAffiliation>,
    ) -> Result<Page<Collaborator>> {
        self.state().collaborator_affiliations.push(affiliation);
        self.user_page(&format!("collaborators:{owner}/{name}"), page)
    }

    async fn list_repository_teams(
        &self,
        owner: &str,
        name: &str,
        page: u32,
    ) -> Result<Page<Team>> {
        self.team_page(&format!("repo_teams:{owner}/{name}"), page)
    }

    async fn list_organization_members(
        &self,
        org: &str,
        page: u32,
        admins_only: bool,
    ) -> Result<Page<Collaborator>> {
        let key = if admins_only {
            format!("admins:{org}")
        } else {
            format!("members:{org}")
        };
        self.user_page(&key, page)
    }

    async fn list_team_members(
        &self,
        org: &str,
        team: &str,
        page: u32,
    ) -> Result<Page<Collaborator>> {
        self.user_page(&format!("team_members:{org}/{team}"), page)
    }

    async fn get_authenticated_user_orgs_details_and_membership(
        &self,
        page: u32,
    ) -> Result<Page<OrgDetailsAndMembership>> {
        self.record("orgs", page)?;
        Ok(Self::page(Some(&self.state().orgs), page))
    }

    async fn get_authenticated_user_teams(&self, page: u32) -> Result<Page<Team>> {
        self.team_page("user_teams", page)
    }

    async fn get_organization(&self, login: &str) -> Result<OrgDetails> {
        let key = format!("get_org:{login}");
        self.record(&key, 1)?;
        self.state()
            .org_details
            .get(login)
            .cloned()
            .ok_or_else(|| ClientError::http(404, key, "Not Found"))
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository> {
        let full_name = format!("{owner}/{name}");
        let key = format!("get_repo:{full_name}");
        self.record(&key, 1)?;
        self.state()
            .repositories
            .get(&full_name)
            .cloned()
            .ok_or_else(|| ClientError::http(404, key, "Not Found"))
    }

    async fn get_authenticated_oauth_scopes(&self) -> Result<Vec<String>> {
        self.record("scopes", 1)?;
        match self.state().scopes.clone() {
            Some(Ok(scopes)) => Ok(scopes),
            Some(Err(status)) => Err(ClientError::http(status, "/", "scopes error")),
            None => Ok(Vec::new()),
        }
    }
}
