use std::sync::Arc;

use async_trait::async_trait;

use super::auth::OAuthBearerToken;
use super::errors::Result;
use super::types::{
    Collaborator, CollaboratorAffiliation, OrgDetails, OrgDetailsAndMembership, Page, Repository,
    RepositoryAffiliation, Team, Visibility,
};

/// Maximum page size accepted by list endpoints.
pub const MAX_PER_PAGE: u32 = 100;

/// Read access to the organization, team and repository data of a code host.
///
/// Pages are 1-based. Implementations own transport concerns (retry, pacing,
/// token refresh); callers only consume items and the `has_next_page` flag.
#[async_trait]
pub trait CodeHostClient: Send + Sync {
    /// Return a client that authenticates as the owner of `token`.
    fn with_authenticator(&self, token: OAuthBearerToken) -> Arc<dyn CodeHostClient>;

    /// Repositories the authenticated user is affiliated with.
    ///
    /// An empty `affiliations` slice means every affiliation.
    async fn list_affiliated_repositories(
        &self,
        visibility: Visibility,
        page: u32,
        per_page: u32,
        affiliations: &[RepositoryAffiliation],
    ) -> Result<Page<Repository>>;

    /// Repositories of an organization. An empty `repo_type` uses the host default.
    async fn list_org_repositories(
        &self,
        org: &str,
        page: u32,
        repo_type: &str,
    ) -> Result<Page<Repository>>;

    async fn list_team_repositories(
        &self,
        org: &str,
        team: &str,
        page: u32,
    ) -> Result<Page<Repository>>;

    /// Collaborators of a repository. `None` lists every affiliation.
    async fn list_repository_collaborators(
        &self,
        owner: &str,
        name: &str,
        page: u32,
        affiliation: Option<CollaboratorAffiliation>,
    ) -> Result<Page<Collaborator>>;

    async fn list_repository_teams(&self, owner: &str, name: &str, page: u32)
    -> Result<Page<Team>>;

    async fn list_organization_members(
        &self,
        org: &str,
        page: u32,
        admins_only: bool,
    ) -> Result<Page<Collaborator>>;

    async fn list_team_members(
        &self,
        org: &str,
        team: &str,
        page: u32,
    ) -> Result<Page<Collaborator>>;

    async fn get_authenticated_user_orgs_details_and_membership(
        &self,
        page: u32,
    ) -> Result<Page<OrgDetailsAndMembership>>;

    async fn get_authenticated_user_teams(&self, page: u32) -> Result<Page<Team>>;

    /// Look up an organization. A 404 means `login` is not an organization.
    async fn get_organization(&self, login: &str) -> Result<OrgDetails>;

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository>;

    /// OAuth scopes granted to the token this client authenticates with.
    async fn get_authenticated_oauth_scopes(&self) -> Result<Vec<String>>;
}
