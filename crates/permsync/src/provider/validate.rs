use super::PermissionProvider;

/// Any one of these scopes lets the token read organization and team membership.
const ORG_SCOPES: &[&str] = &["read:org", "write:org", "admin:org"];

impl PermissionProvider {
    /// Check that the site credential can do what the configuration needs.
    ///
    /// Returns one human-readable problem per unmet requirement; an empty list
    /// means the connection is healthy.
    pub async fn validate_connection(&self) -> Vec<String> {
        if self.groups_cache.is_none() {
            return Vec::new();
        }

        let scopes = match self.client.get_authenticated_oauth_scopes().await {
            Ok(scopes) => scopes,
            Err(e) => {
                return vec![format!(
                    "Additional OAuth scopes are required, but failed to get available scopes: {e}"
                )];
            }
        };

        let mut problems = Vec::new();
        if !scopes.iter().any(|s| ORG_SCOPES.contains(&s.as_str())) {
            problems.push(
                "Scope `read:org`, `write:org`, or `admin:org` is required to enable `groupsCacheTTL`"
                    .to_string(),
            );
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::provider::fake::FakeClient;
    use crate::provider::{CodeHost, PermissionProvider, ProviderOptions};

    fn provider(client: &FakeClient, ttl_hours: i64) -> PermissionProvider {
        PermissionProvider::new(
            CodeHost::github("https://github.com").unwrap(),
            Arc::new(client.clone()),
            ProviderOptions {
                groups_cache_ttl_hours: ttl_hours,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_cache_disabled_has_no_requirements() {
        let client = FakeClient::new();
        let problems = provider(&client, -1).validate_connection().await;
        assert!(problems.is_empty());
        assert_eq!(client.calls("scopes"), 0);
    }

    #[tokio::test]
    async fn test_scope_lookup_failure_is_a_problem() {
        let client = FakeClient::new().scopes_error(500);
        let problems = provider(&client, 0).validate_connection().await;
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("scopes error"), "{}", problems[0]);
    }

    #[tokio::test]
    async fn test_missing_org_scope() {
        let client = FakeClient::new().scopes(&["repo"]);
        let problems = provider(&client, 0).validate_connection().await;
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("read:org"));
    }

    #[tokio::test]
    async fn test_token_without_scopes() {
        let client = FakeClient::new().scopes(&[]);
        let problems = provider(&client, 0).validate_connection().await;
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("read:org"));
    }

    #[tokio::test]
    async fn test_any_org_scope_is_enough() {
        for scope in ["read:org", "write:org", "admin:org"] {
            let client = FakeClient::new().scopes(&["repo", scope]);
            let problems = provider(&client, 0).validate_connection().await;
            assert!(problems.is_empty(), "{scope}: {problems:?}");
        }
    }
}
