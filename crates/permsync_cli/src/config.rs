//! Configuration file support for permsync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `PERMSYNC_`, sections split by `__`,
//!    e.g., `PERMSYNC_GITHUB__TOKEN`)
//! 3. Config file (~/.config/permsync/config.toml or ./permsync.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/permsync/permsync.db` on Linux
//! (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/permsync/permsync.db"  # optional, this is the default
//!
//! [github]
//! token = "ghp_..."  # or use PERMSYNC_GITHUB__TOKEN env var
//! base_url = "https://github.com"
//! groups_cache_ttl_hours = 0  # 0 means 72h, negative disables the groups cache
//! enable_internal_repo_visibility = false
//! requests_per_second = 10
//!
//! [sync]
//! schedule_interval_secs = 15
//! user_backoff_secs = 60
//! repo_backoff_secs = 60
//! oldest_users = 10
//! oldest_repos = 10
//! history_size = 5
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use permsync::cleaner::{CleanerOptions, DEFAULT_HISTORY_SIZE};
use permsync::github::GITHUB_DEFAULT_RPS;
use permsync::scheduler::SchedulerOptions;
use serde::Deserialize;

const APP_NAME: &str = "permsync";
const ENV_PREFIX: &str = "PERMSYNC";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// GitHub configuration.
    pub github: GitHubConfig,
    /// Scheduler and cleaner options.
    pub sync: SyncConfig,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Supports sqlite:// and postgres:// schemes.
    /// Defaults to `sqlite://~/.local/state/permsync/permsync.db` if not specified.
    pub url: Option<String>,
}

/// GitHub configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token used for repository-centric syncs and validation.
    pub token: Option<String>,
    /// Web URL of the GitHub instance. Any non-github.com host is treated as
    /// GitHub Enterprise Server.
    pub base_url: String,
    /// Groups cache lifetime. Zero means the default (72h), negative disables caching.
    pub groups_cache_ttl_hours: i64,
    /// Treat internal repositories as readable by every organization member.
    pub enable_internal_repo_visibility: bool,
    /// Upper bound on API requests per second.
    pub requests_per_second: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: "https://github.com".to_string(),
            groups_cache_ttl_hours: 0,
            enable_internal_repo_visibility: false,
            requests_per_second: GITHUB_DEFAULT_RPS,
        }
    }
}

/// Scheduler and job history options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between passes of `permsync run`.
    pub schedule_interval_secs: u64,
    /// Minimum age of a user's permissions before they are resynced.
    pub user_backoff_secs: u64,
    /// Minimum age of a repository's permissions before they are resynced.
    pub repo_backoff_secs: u64,
    /// Users with the oldest permissions scheduled per pass. Negative means
    /// the default, zero disables.
    pub oldest_users: Option<i64>,
    pub oldest_repos: Option<i64>,
    /// Finished jobs kept per subject.
    pub history_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let scheduler = SchedulerOptions::default();
        Self {
            schedule_interval_secs: scheduler.interval.as_secs(),
            user_backoff_secs: scheduler.user_backoff.as_secs(),
            repo_backoff_secs: scheduler.repo_backoff.as_secs(),
            oldest_users: None,
            oldest_repos: None,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl SyncConfig {
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            interval: Duration::from_secs(self.schedule_interval_secs),
            user_backoff: Duration::from_secs(self.user_backoff_secs),
            repo_backoff: Duration::from_secs(self.repo_backoff_secs),
            oldest_users: self.oldest_users,
            oldest_repos: self.oldest_repos,
        }
    }

    pub fn cleaner_options(&self) -> CleanerOptions {
        CleanerOptions {
            history_size: self.history_size,
        }
    }
}

/// `PERMSYNC_` environment source. Section and key are split by a double
/// underscore so keys may contain single underscores.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/permsync/config.toml)
    /// 3. Local config file (./permsync.toml)
    /// 4. Environment variables with PERMSYNC_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(config_path) = Self::default_config_path()
            && config_path.exists()
        {
            tracing::debug!("Loading config from {:?}", config_path);
            builder = builder.add_source(
                File::from(config_path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // Local config file (higher priority than XDG)
        let local_config = PathBuf::from("permsync.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./permsync.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(environment());

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter enables read-write access and creates the file if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("permsync.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .filter(|token| !token.trim().is_empty())
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/permsync` or `~/.local/state/permsync`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| {
            // state_dir() returns None on macOS/Windows
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_toml(toml_content: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(config::File::from_str(toml_content, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database.url.is_none());
        assert!(config.github.token.is_none());
        assert_eq!(config.github.base_url, "https://github.com");
        assert_eq!(config.github.groups_cache_ttl_hours, 0);
        assert!(!config.github.enable_internal_repo_visibility);
        assert_eq!(config.github.requests_per_second, 10);
        assert_eq!(config.sync.schedule_interval_secs, 15);
        assert_eq!(config.sync.user_backoff_secs, 60);
        assert_eq!(config.sync.repo_backoff_secs, 60);
        assert_eq!(config.sync.oldest_users, None);
        assert_eq!(config.sync.history_size, 5);
    }

    #[test]
    fn test_config_builder_with_defaults() {
        let settings = ConfigBuilder::builder().build().unwrap();

        let config: Config = settings.try_deserialize().unwrap_or_default();

        assert_eq!(config.sync.history_size, 5);
        assert_eq!(config.github.groups_cache_ttl_hours, 0);
    }

    #[test]
    fn test_full_config_parsing() {
        let config = from_toml(
            r#"
            [database]
            url = "sqlite:///tmp/test.db"

            [github]
            token = "ghp_test123"
            base_url = "https://ghe.example.com"
            groups_cache_ttl_hours = -1
            enable_internal_repo_visibility = true
            requests_per_second = 3

            [sync]
            schedule_interval_secs = 30
            user_backoff_secs = 120
            repo_backoff_secs = 240
            oldest_users = 0
            oldest_repos = 25
            history_size = 2
        "#,
        );

        assert_eq!(
            config.database.url,
            Some("sqlite:///tmp/test.db".to_string())
        );
        assert_eq!(config.github_token(), Some("ghp_test123".to_string()));
        assert_eq!(config.github.base_url, "https://ghe.example.com");
        assert_eq!(config.github.groups_cache_ttl_hours, -1);
        assert!(config.github.enable_internal_repo_visibility);
        assert_eq!(config.github.requests_per_second, 3);

        let scheduler = config.sync.scheduler_options();
        assert_eq!(scheduler.interval, Duration::from_secs(30));
        assert_eq!(scheduler.user_backoff, Duration::from_secs(120));
        assert_eq!(scheduler.repo_backoff, Duration::from_secs(240));
        assert_eq!(scheduler.oldest_users, Some(0));
        assert_eq!(scheduler.oldest_repos, Some(25));
        assert_eq!(config.sync.cleaner_options().history_size, 2);
    }

    #[test]
    fn test_config_builder_partial_override() {
        let config = from_toml(
            r#"
            [sync]
            history_size = 9
        "#,
        );

        assert_eq!(config.sync.history_size, 9);
        // Other values should be defaults
        assert_eq!(config.sync.schedule_interval_secs, 15);
        assert_eq!(config.github.requests_per_second, 10);
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let config = from_toml(
            r#"
            [github]
            token = "  "
        "#,
        );
        assert_eq!(config.github_token(), None);
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        let vars = HashMap::from([
            (
                "PERMSYNC_GITHUB__GROUPS_CACHE_TTL_HOURS".to_string(),
                "-1".to_string(),
            ),
            ("PERMSYNC_GITHUB__TOKEN".to_string(), "ghp_env".to_string()),
            ("PERMSYNC_SYNC__HISTORY_SIZE".to_string(), "7".to_string()),
        ]);

        let config: Config = ConfigBuilder::builder()
            .add_source(config::File::from_str(
                "[sync]\nhistory_size = 3\n",
                FileFormat::Toml,
            ))
            .add_source(environment().source(Some(vars)))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.github.groups_cache_ttl_hours, -1);
        assert_eq!(config.github_token(), Some("ghp_env".to_string()));
        assert_eq!(config.sync.history_size, 7);
    }

    #[test]
    fn test_config_merging_order() {
        let base_toml = r#"
            [sync]
            user_backoff_secs = 300
            repo_backoff_secs = 600
        "#;

        let override_toml = r#"
            [sync]
            user_backoff_secs = 30
        "#;

        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(base_toml, FileFormat::Toml))
            .add_source(config::File::from_str(override_toml, FileFormat::Toml))
            .build()
            .unwrap();

        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.sync.user_backoff_secs, 30);
        assert_eq!(config.sync.repo_backoff_secs, 600);
    }

    #[test]
    fn test_config_invalid_toml() {
        let invalid_toml = r#"
            [sync
            history_size = 5
        "#;

        let result = ConfigBuilder::builder()
            .add_source(config::File::from_str(invalid_toml, FileFormat::Toml))
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_config_unknown_fields_ignored() {
        let config = from_toml(
            r#"
            [sync]
            history_size = 4
            unknown_field = "should be ignored"
        "#,
        );
        assert_eq!(config.sync.history_size, 4);
    }

    #[test]
    fn test_database_url_prefers_configured_value() {
        let config = from_toml(
            r#"
            [database]
            url = "postgres://localhost/permsync"
        "#,
        );
        assert_eq!(
            config.database_url().as_deref(),
            Some("postgres://localhost/permsync")
        );
    }
}
