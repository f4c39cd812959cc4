//! permsync CLI - schedules and runs repository permission syncs.

mod commands;
mod config;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::jobs::{JobsFilter, ReasonGroupArg, StateArg};
use crate::commands::perms::{RepoPermsArgs, UserPermsArgs};
use crate::commands::shared::{OutputFormat, SubjectArg};

#[derive(Parser)]
#[command(name = "permsync")]
#[command(version)]
#[command(about = "Repository permission sync for GitHub")]
#[command(
    long_about = "permsync keeps a local record of which users can read which GitHub \
repositories. It fetches permissions in both directions, caches organization and team \
membership, schedules periodic resyncs and trims finished job history."
)]
#[command(after_long_help = r#"EXAMPLES
    Prepare the database:
        $ permsync migrate up

    Register users and repositories for the scheduler to pick up:
        $ permsync register user 1 2 3

    Run the scheduler and history cleaner until Ctrl+C:
        $ permsync run

    Fetch and store the repositories GitHub account 583231 can read:
        $ permsync user-perms 583231 --user-id 1

    Fetch and store the accounts that can read a repository:
        $ permsync repo-perms octo-org/widgets --id 10

CONFIGURATION
    permsync reads configuration from:
      1. ~/.config/permsync/config.toml (or $XDG_CONFIG_HOME/permsync/config.toml)
      2. ./permsync.toml
      3. Environment variables (PERMSYNC_* prefix, sections split by "__")
      4. .env file in current directory

ENVIRONMENT VARIABLES
    PERMSYNC_DATABASE__URL                    Database connection string
    PERMSYNC_GITHUB__TOKEN                    GitHub token
    PERMSYNC_GITHUB__BASE_URL                 GitHub web URL (default: https://github.com)
    PERMSYNC_GITHUB__GROUPS_CACHE_TTL_HOURS   Groups cache TTL (0 = 72h, negative disables)
    PERMSYNC_SYNC__HISTORY_SIZE               Finished jobs kept per subject (default: 5)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Run one scheduling pass
    Schedule,
    /// Run one job history cleanup pass
    Clean,
    /// Schedule and clean periodically until interrupted
    Run,
    /// Check the GitHub connection for configuration problems
    Validate,
    /// Fetch and store the repositories a GitHub account can read
    UserPerms {
        /// GitHub account (database) ID
        account_id: String,

        /// Local user ID the permissions are stored under
        #[arg(short, long)]
        user_id: i32,

        /// Token of the account (defaults to the configured GitHub token)
        #[arg(short, long, env = "PERMSYNC_ACCOUNT_TOKEN", hide_env_values = true)]
        token: Option<String>,

        #[command(flatten)]
        fetch_opts: FetchOptions,
    },
    /// Fetch and store the GitHub accounts that can read a repository
    RepoPerms {
        /// Repository as owner/name
        name_with_owner: String,

        /// Local repository ID the permissions are stored under
        #[arg(long = "id")]
        repo_id: i32,

        /// GitHub node ID of the repository
        #[arg(long)]
        node_id: Option<String>,

        #[command(flatten)]
        fetch_opts: FetchOptions,
    },
    /// Enqueue a manual high-priority sync
    Enqueue {
        #[arg(value_enum)]
        subject: SubjectArg,

        id: i32,

        /// Bypass the groups cache when the job runs
        #[arg(long)]
        invalidate_caches: bool,

        /// Local user ID of whoever requested the sync
        #[arg(long)]
        triggered_by: Option<i32>,
    },
    /// Record subjects that have no permissions yet
    Register {
        #[arg(value_enum)]
        subject: SubjectArg,

        #[arg(required = true)]
        ids: Vec<i32>,
    },
    /// List sync jobs, newest first
    Jobs {
        #[arg(short, long, value_enum)]
        state: Option<StateArg>,

        #[arg(long)]
        user: Option<i32>,

        #[arg(long)]
        repo: Option<i32>,

        #[arg(short, long, value_enum)]
        reason_group: Option<ReasonGroupArg>,

        #[arg(short, long, default_value_t = 50)]
        limit: u64,

        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

/// Options shared by the permission fetch commands.
#[derive(Debug, Clone, clap::Args)]
struct FetchOptions {
    /// Ignore cached organization and team data
    #[arg(short, long)]
    invalidate_caches: bool,

    /// Fetch without storing the result
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Structured logging only when not attached to a TTY
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("permsync=info,permsync_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = config::Config::load();

    let cli = Cli::parse();

    // Commands that don't need the database
    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let database_url = config
        .database_url()
        .ok_or("Could not determine a database URL; set PERMSYNC_DATABASE__URL")?;

    // Ensure the database directory exists for SQLite
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        // Strip query parameters (e.g., ?mode=rwc) before path operations
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_path = std::path::Path::new(db_path);

        if db_path.is_relative() && !db_path.as_os_str().is_empty() {
            tracing::warn!(
                "Database path '{}' is relative - behavior depends on current directory. \
                 Consider using an absolute path.",
                db_path.display()
            );
        }

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    if let Commands::Migrate { action } = cli.command {
        return commands::migrate::handle_migrate(action, &database_url).await;
    }

    let db = Arc::new(permsync::connect_and_migrate(&database_url).await?);

    match cli.command {
        Commands::Schedule => commands::schedule::handle_schedule(&config, &db).await?,
        Commands::Clean => commands::schedule::handle_clean(&config, &db).await?,
        Commands::Run => {
            shutdown::setup_shutdown_handler();
            commands::schedule::handle_run(&config, &db).await?;
        }
        Commands::Validate => commands::perms::handle_validate(&config, &db).await?,
        Commands::UserPerms {
            account_id,
            user_id,
            token,
            fetch_opts,
        } => {
            let args = UserPermsArgs {
                account_id,
                user_id,
                token,
                invalidate_caches: fetch_opts.invalidate_caches,
                dry_run: fetch_opts.dry_run,
                output: fetch_opts.output,
            };
            commands::perms::handle_user_perms(args, &config, &db).await?;
        }
        Commands::RepoPerms {
            name_with_owner,
            repo_id,
            node_id,
            fetch_opts,
        } => {
            let args = RepoPermsArgs {
                name_with_owner,
                repo_id,
                node_id,
                invalidate_caches: fetch_opts.invalidate_caches,
                dry_run: fetch_opts.dry_run,
                output: fetch_opts.output,
            };
            commands::perms::handle_repo_perms(args, &config, &db).await?;
        }
        Commands::Enqueue {
            subject,
            id,
            invalidate_caches,
            triggered_by,
        } => {
            commands::jobs::handle_enqueue(subject, id, invalidate_caches, triggered_by, &db)
                .await?;
        }
        Commands::Register { subject, ids } => {
            commands::jobs::handle_register(subject, ids, &db).await?;
        }
        Commands::Jobs {
            state,
            user,
            repo,
            reason_group,
            limit,
            offset,
            output,
        } => {
            let filter = JobsFilter {
                state,
                user,
                repo,
                reason_group,
                limit,
                offset,
            };
            commands::jobs::handle_jobs(filter, output, &db).await?;
        }
        Commands::Migrate { .. } | Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}
