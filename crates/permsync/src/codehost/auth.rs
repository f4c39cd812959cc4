//! OAuth bearer tokens and the refresh hook used by authenticated clients.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::errors::Result;

/// Default window before expiry in which a token is refreshed.
pub const DEFAULT_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Fresh credentials produced by a [`TokenRefresher`].
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

/// Exchanges an expiring token for a new one and stores it for later use.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, token: &OAuthBearerToken) -> Result<RefreshedToken>;
}

/// An OAuth bearer token, optionally able to refresh itself.
#[derive(Clone)]
pub struct OAuthBearerToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub refresh_buffer: Duration,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl OAuthBearerToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expiry: None,
            refresh_buffer: Duration::minutes(DEFAULT_REFRESH_BUFFER_MINUTES),
            refresher: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: Option<DateTime<Utc>>) -> Self {
        self.expiry = expiry;
        self
    }

    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn has_refresher(&self) -> bool {
        self.refresher.is_some()
    }

    /// Whether the token should be refreshed before being used at `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.refresher.is_some()
            && self
                .expiry
                .is_some_and(|expiry| expiry - self.refresh_buffer <= now)
    }

    /// Refresh in place if the token is close to expiry. Returns whether it changed.
    pub async fn refresh_if_needed(&mut self, now: DateTime<Utc>) -> Result<bool> {
        if !self.needs_refresh(now) {
            return Ok(false);
        }
        let Some(refresher) = self.refresher.clone() else {
            return Ok(false);
        };
        let fresh = refresher.refresh(self).await?;
        self.access_token = fresh.access_token;
        if fresh.refresh_token.is_some() {
            self.refresh_token = fresh.refresh_token;
        }
        self.expiry = fresh.expiry;
        tracing::debug!("refreshed OAuth bearer token");
        Ok(true)
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for OAuthBearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthBearerToken")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expiry", &self.expiry)
            .field("has_refresher", &self.refresher.is_some())
            .finish()
    }
}

impl fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("access_token", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}
