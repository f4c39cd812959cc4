use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use permsync::codehost::OAuthBearerToken;
use permsync::github::GitHubClient;
use permsync::provider::{CodeHost, PermissionProvider, ProviderOptions};
use permsync::{CodeHostClient, DbCacheStore};
use sea_orm::DatabaseConnection;

use crate::config::Config;

/// Per-request timeout for GitHub API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Output format for listings.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Subject kind accepted by `enqueue` and `register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum SubjectArg {
    User,
    Repo,
}

/// Build a GitHub client from config, authenticated with the configured token
/// when one is set.
pub(crate) fn github_client(config: &Config) -> Result<GitHubClient, Box<dyn std::error::Error>> {
    let mut client = GitHubClient::with_reqwest(Some(&config.github.base_url), REQUEST_TIMEOUT)?
        .with_requests_per_second(config.github.requests_per_second);
    if let Some(token) = config.github_token() {
        client = client.with_token(OAuthBearerToken::new(token));
    } else {
        tracing::warn!("No GitHub token configured; requests are unauthenticated");
    }
    Ok(client)
}

/// Build a permission provider whose groups cache lives in the database.
pub(crate) fn build_provider(
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> Result<PermissionProvider, Box<dyn std::error::Error>> {
    let code_host = CodeHost::github(&config.github.base_url)?;
    let client: Arc<dyn CodeHostClient> = Arc::new(github_client(config)?);
    let opts = ProviderOptions {
        groups_cache_ttl_hours: config.github.groups_cache_ttl_hours,
        cache_store: Some(Arc::new(DbCacheStore::new(Arc::clone(db)))),
        enable_internal_repo_visibility: config.github.enable_internal_repo_visibility,
        token_refresher: None,
    };
    Ok(PermissionProvider::new(code_host, client, opts))
}

pub(crate) fn print_json<T: serde::Serialize>(
    value: &T,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
