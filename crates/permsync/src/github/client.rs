use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use url::Url;

use crate::codehost::{
    ClientError, CodeHostClient, Collaborator, CollaboratorAffiliation, MAX_PER_PAGE,
    OAuthBearerToken, OrgDetails, OrgDetailsAndMembership, OrgMembership, OrgRef, Page,
    Repository, RepositoryAffiliation, Result, Team, Visibility,
};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::retry::{RetryConfig, with_retry};

use super::links::parse_link_header;
use super::rate_limit::{ApiRateLimiter, exhausted_until};

/// API root for github.com.
pub const DEFAULT_API_ROOT: &str = "https://api.github.com";

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// Resolve the REST API root for a GitHub instance.
///
/// `None`, an empty string or any github.com URL maps to [`DEFAULT_API_ROOT`];
/// any other host is treated as GitHub Enterprise Server (`{base}/api/v3`).
pub fn api_root_for(base_url: Option<&str>) -> Result<String> {
    let Some(base) = base_url.map(str::trim).filter(|b| !b.is_empty()) else {
        return Ok(DEFAULT_API_ROOT.to_string());
    };
    let parsed = Url::parse(base)
        .map_err(|e| ClientError::Config(format!("invalid GitHub base URL {base:?}: {e}")))?;
    match parsed.host_str() {
        Some("github.com" | "www.github.com" | "api.github.com") => {
            Ok(DEFAULT_API_ROOT.to_string())
        }
        Some(_) => Ok(format!("{}/api/v3", parsed.as_str().trim_end_matches('/'))),
        None => Err(ClientError::Config(format!(
            "GitHub base URL {base:?} has no host"
        ))),
    }
}

/// REST client for the GitHub v3 API.
///
/// Clones share the transport and the request pacer. A client obtained from
/// [`CodeHostClient::with_authenticator`] additionally owns its token and
/// refreshes it before use when a refresher is attached.
#[derive(Clone)]
pub struct GitHubClient {
    api_root: String,
    transport: Arc<dyn HttpTransport>,
    token: Option<Arc<RwLock<OAuthBearerToken>>>,
    limiter: ApiRateLimiter,
    retry: RetryConfig,
}

impl GitHubClient {
    pub fn new(base_url: Option<&str>, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        Ok(Self {
            api_root: api_root_for(base_url)?,
            transport,
            token: None,
            limiter: ApiRateLimiter::default(),
            retry: RetryConfig::default(),
        })
    }

    /// Build a client over a reqwest transport with the given request timeout.
    pub fn with_reqwest(base_url: Option<&str>, timeout: std::time::Duration) -> Result<Self> {
        let transport = crate::http::reqwest_transport::ReqwestTransport::with_timeout(timeout)
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Self::new(base_url, Arc::new(transport))
    }

    #[must_use]
    pub fn with_token(mut self, token: OAuthBearerToken) -> Self {
        self.token = Some(Arc::new(RwLock::new(token)));
        self
    }

    #[must_use]
    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.limiter = ApiRateLimiter::new(rps);
        self
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    async fn authorization(&self) -> Result<Option<String>> {
        let Some(token) = &self.token else {
            return Ok(None);
        };
        {
            let current = token.read().await;
            if !current.needs_refresh(Utc::now()) {
                return Ok(Some(current.authorization_header()));
            }
        }
        let mut current = token.write().await;
        current.refresh_if_needed(Utc::now()).await?;
        Ok(Some(current.authorization_header()))
    }

    async fn send_once(&self, url: &str) -> Result<HttpResponse> {
        self.limiter.wait().await;

        let mut request = HttpRequest::get(url)
            .header("Accept", ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(auth) = self.authorization().await? {
            request = request.header("Authorization", auth);
        }

        let resp = self
            .transport
            .send(request)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if resp.is_success() {
            return Ok(resp);
        }
        if let Some(reset_at) = exhausted_until(&resp) {
            return Err(ClientError::RateLimited { reset_at });
        }
        Err(ClientError::http(resp.status, url, error_message(&resp)))
    }

    /// GET `path` (starting with `/`), retrying while rate limited.
    async fn get(&self, path: &str) -> Result<HttpResponse> {
        let url = format!("{}{}", self.api_root, path);
        with_retry(
            || self.send_once(&url),
            self.retry.clone(),
            ClientError::is_rate_limited,
            path,
        )
        .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.get(path).await?;
        Ok(serde_json::from_slice(&resp.body)?)
    }

    async fn get_page<T: DeserializeOwned>(&self, path: &str) -> Result<Page<T>> {
        let resp = self.get(path).await?;
        let has_next_page = resp
            .header("link")
            .is_some_and(|link| parse_link_header(link).has_next_page());
        let items: Vec<T> = serde_json::from_slice(&resp.body)?;
        Ok(Page::new(items, has_next_page, 1))
    }
}

/// Path plus query with `per_page`/`page` appended after `params`.
fn paged(path: &str, params: &[(&str, &str)], per_page: u32, page: u32) -> String {
    let mut query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    query.push(format!("per_page={per_page}"));
    query.push(format!("page={page}"));
    format!("{path}?{}", query.join("&"))
}

fn error_message(resp: &HttpResponse) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }
    match serde_json::from_slice::<ErrorBody>(&resp.body) {
        Ok(body) => body.message,
        Err(_) => String::from_utf8_lossy(&resp.body).chars().take(200).collect(),
    }
}

#[async_trait]
impl CodeHostClient for GitHubClient {
    fn with_authenticator(&self, token: OAuthBearerToken) -> Arc<dyn CodeHostClient> {
        Arc::new(self.clone().with_token(token))
    }

    async fn list_affiliated_repositories(
        &self,
        visibility: Visibility,
        page: u32,
        per_page: u32,
        affiliations: &[RepositoryAffiliation],
    ) -> Result<Page<Repository>> {
        let affiliation = affiliations
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let mut params = vec![("visibility", visibility.as_str())];
        if !affiliation.is_empty() {
            params.push(("affiliation", affiliation.as_str()));
        }
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        self.get_page(&paged("/user/repos", &params, per_page, page))
            .await
    }

    async fn list_org_repositories(
        &self,
        org: &str,
        page: u32,
        repo_type: &str,
    ) -> Result<Page<Repository>> {
        let mut params = Vec::new();
        if !repo_type.is_empty() {
            params.push(("type", repo_type));
        }
        self.get_page(&paged(
            &format!("/orgs/{org}/repos"),
            &params,
            MAX_PER_PAGE,
            page,
        ))
        .await
    }

    async fn list_team_repositories(
        &self,
        org: &str,
        team: &str,
        page: u32,
    ) -> Result<Page<Repository>> {
        self.get_page(&paged(
            &format!("/orgs/{org}/teams/{team}/repos"),
            &[],
            MAX_PER_PAGE,
            page,
        ))
        .await
    }

    async fn list_repository_collaborators(
        &self,
        owner: &str,
        name: &str,
        page: u32,
        affiliation: Option<CollaboratorAffiliation>,
    ) -> Result<Page<Collaborator>> {
        let params: Vec<(&str, &str)> = affiliation
            .map(|a| ("affiliation", a.as_str()))
            .into_iter()
            .collect();
        self.get_page(&paged(
            &format!("/repos/{owner}/{name}/collaborators"),
            &params,
            MAX_PER_PAGE,
            page,
        ))
        .await
    }

    async fn list_repository_teams(
        &self,
        owner: &str,
        name: &str,
        page: u32,
    ) -> Result<Page<Team>> {
        self.get_page(&paged(
            &format!("/repos/{owner}/{name}/teams"),
            &[],
            MAX_PER_PAGE,
            page,
        ))
        .await
    }

    async fn list_organization_members(
        &self,
        org: &str,
        page: u32,
        admins_only: bool,
    ) -> Result<Page<Collaborator>> {
        let params: &[(&str, &str)] = if admins_only { &[("role", "admin")] } else { &[] };
        self.get_page(&paged(
            &format!("/orgs/{org}/members"),
            params,
            MAX_PER_PAGE,
            page,
        ))
        .await
    }

    async fn list_team_members(
        &self,
        org: &str,
        team: &str,
        page: u32,
    ) -> Result<Page<Collaborator>> {
        self.get_page(&paged(
            &format!("/orgs/{org}/teams/{team}/members"),
            &[],
            MAX_PER_PAGE,
            page,
        ))
        .await
    }

    async fn get_authenticated_user_orgs_details_and_membership(
        &self,
        page: u32,
    ) -> Result<Page<OrgDetailsAndMembership>> {
        let orgs: Page<OrgRef> = self
            .get_page(&paged("/user/orgs", &[], MAX_PER_PAGE, page))
            .await?;

        let mut items = Vec::with_capacity(orgs.items.len());
        for org in &orgs.items {
            let details: OrgDetails = self.get_json(&format!("/orgs/{}", org.login)).await?;
            let membership: OrgMembership = self
                .get_json(&format!("/user/memberships/orgs/{}", org.login))
                .await?;
            items.push(OrgDetailsAndMembership {
                details: Some(details),
                membership: Some(membership),
            });
        }

        // One listing request plus two lookups per organization.
        let cost = orgs.cost + 2 * items.len() as u32;
        Ok(Page::new(items, orgs.has_next_page, cost))
    }

    async fn get_authenticated_user_teams(&self, page: u32) -> Result<Page<Team>> {
        self.get_page(&paged("/user/teams", &[], MAX_PER_PAGE, page))
            .await
    }

    async fn get_organization(&self, login: &str) -> Result<OrgDetails> {
        self.get_json(&format!("/orgs/{login}")).await
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository> {
        self.get_json(&format!("/repos/{owner}/{name}")).await
    }

    async fn get_authenticated_oauth_scopes(&self) -> Result<Vec<String>> {
        let resp = self.get("/").await?;
        Ok(resp
            .header("x-oauth-scopes")
            .map(|scopes| {
                scopes
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }
}
