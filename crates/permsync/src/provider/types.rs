use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::codehost::{AccountId, RepoId};

/// Service type of every GitHub code host.
pub const GITHUB_SERVICE_TYPE: &str = "github";

/// Identity of the code host a provider serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeHost {
    pub service_type: String,
    /// Normalized base URL with a trailing slash, e.g. `https://github.com/`.
    pub service_id: String,
    pub base_url: Url,
}

impl CodeHost {
    pub fn github(base_url: &str) -> Result<Self, url::ParseError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        base_url.set_query(None);
        base_url.set_fragment(None);
        Ok(Self {
            service_type: GITHUB_SERVICE_TYPE.to_string(),
            service_id: base_url.to_string(),
            base_url,
        })
    }

    pub fn hostname(&self) -> &str {
        self.base_url.host_str().unwrap_or_default()
    }
}

/// OAuth credentials stored with an external account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

/// Provider-specific data attached to an external account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    #[serde(default)]
    pub token: Option<AccountToken>,
    /// Set when the account was provisioned through a GitHub App installation.
    #[serde(default)]
    pub installation_id: Option<i64>,
}

/// A platform user's account on a code host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Platform user the account belongs to.
    pub user_id: i32,
    pub service_type: String,
    pub service_id: String,
    /// Stable code host ID of the account; empty when unknown.
    pub account_id: AccountId,
    pub data: AccountData,
}

/// A repository mirrored from a code host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRepo {
    /// Platform repository ID.
    pub id: i32,
    /// Canonical URI, `host/owner/name`.
    pub uri: String,
    pub service_type: String,
    pub service_id: String,
    pub external_id: RepoId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchPermsOptions {
    /// Discard cached group facts and refetch them.
    pub invalidate_caches: bool,
}

/// Repositories a user can access on the code host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUserPermissions {
    pub exacts: Vec<RepoId>,
}
