use std::sync::Arc;

use console::style;
use permsync::codehost::{AccountId, RepoId};
use permsync::perms_store::{DbPermsStore, PermsStore};
use permsync::provider::{
    Account, AccountData, AccountToken, ExternalRepo, ExternalUserPermissions, FetchError,
    FetchPermsOptions, GITHUB_SERVICE_TYPE, PermissionProvider,
};
use sea_orm::DatabaseConnection;

use crate::commands::shared::{OutputFormat, build_provider, print_json};
use crate::config::Config;

/// Report configuration problems with the code host connection.
pub(crate) async fn handle_validate(
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> Result<(), Box<dyn std::error::Error>> {
    let provider = build_provider(config, db)?;
    let problems = provider.validate_connection().await;

    if problems.is_empty() {
        println!(
            "{} Connection to {} looks good.",
            style("✓").green(),
            provider.service_id()
        );
        return Ok(());
    }

    for problem in &problems {
        println!("{} {}", style("✗").red(), problem);
    }
    Err(format!("{} problem(s) found", problems.len()).into())
}

#[derive(Debug)]
pub(crate) struct UserPermsArgs {
    pub account_id: String,
    pub user_id: i32,
    pub token: Option<String>,
    pub invalidate_caches: bool,
    pub dry_run: bool,
    pub output: OutputFormat,
}

/// Fetch the repositories a GitHub account can read and store them for `user_id`.
pub(crate) async fn handle_user_perms(
    args: UserPermsArgs,
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> Result<(), Box<dyn std::error::Error>> {
    let provider = build_provider(config, db)?;
    let account = account_for(&provider, &args, config);
    let opts = FetchPermsOptions {
        invalidate_caches: args.invalidate_caches,
    };

    let perms = provider
        .fetch_user_perms(Some(&account), opts)
        .await
        .map_err(|e| report_partial(e, |p: &ExternalUserPermissions| p.exacts.len(), "repositories"))?;

    tracing::info!(
        account_id = %account.account_id,
        repositories = perms.exacts.len(),
        "Fetched user permissions"
    );

    if !args.dry_run {
        DbPermsStore::new(Arc::clone(db))
            .save_user_perms(args.user_id, &perms.exacts)
            .await?;
    }

    match args.output {
        OutputFormat::Json => print_json(&perms.exacts)?,
        OutputFormat::Table => {
            for repo in &perms.exacts {
                println!("{repo}");
            }
            println!(
                "\n{} {} repositories for account {}{}",
                style("✓").green(),
                perms.exacts.len(),
                account.account_id,
                if args.dry_run { " (dry run)" } else { "" }
            );
        }
    }
    Ok(())
}

fn account_for(provider: &PermissionProvider, args: &UserPermsArgs, config: &Config) -> Account {
    let token = args
        .token
        .clone()
        .or_else(|| config.github_token())
        .map(|access_token| AccountToken {
            access_token,
            refresh_token: None,
            expiry: None,
        });
    Account {
        user_id: args.user_id,
        service_type: GITHUB_SERVICE_TYPE.to_string(),
        service_id: provider.service_id().to_string(),
        account_id: AccountId::from(args.account_id.as_str()),
        data: AccountData {
            token,
            installation_id: None,
        },
    }
}

#[derive(Debug)]
pub(crate) struct RepoPermsArgs {
    pub name_with_owner: String,
    pub repo_id: i32,
    pub node_id: Option<String>,
    pub invalidate_caches: bool,
    pub dry_run: bool,
    pub output: OutputFormat,
}

/// Fetch the GitHub accounts that can read a repository and store them for `repo_id`.
pub(crate) async fn handle_repo_perms(
    args: RepoPermsArgs,
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> Result<(), Box<dyn std::error::Error>> {
    let provider = build_provider(config, db)?;
    let repo = external_repo(&provider, &args);
    let opts = FetchPermsOptions {
        invalidate_caches: args.invalidate_caches,
    };

    let accounts = provider
        .fetch_repo_perms(Some(&repo), opts)
        .await
        .map_err(|e| report_partial(e, |p: &Vec<AccountId>| p.len(), "accounts"))?;

    tracing::info!(
        repo = %args.name_with_owner,
        accounts = accounts.len(),
        "Fetched repository permissions"
    );

    if !args.dry_run {
        DbPermsStore::new(Arc::clone(db))
            .save_repo_perms(args.repo_id, &accounts)
            .await?;
    }

    match args.output {
        OutputFormat::Json => print_json(&accounts)?,
        OutputFormat::Table => {
            for account in &accounts {
                println!("{account}");
            }
            println!(
                "\n{} {} accounts can read {}{}",
                style("✓").green(),
                accounts.len(),
                args.name_with_owner,
                if args.dry_run { " (dry run)" } else { "" }
            );
        }
    }
    Ok(())
}

fn external_repo(provider: &PermissionProvider, args: &RepoPermsArgs) -> ExternalRepo {
    let host = provider.code_host();
    ExternalRepo {
        id: args.repo_id,
        uri: format!(
            "{}/{}",
            host.hostname(),
            args.name_with_owner.trim_matches('/')
        ),
        service_type: host.service_type.clone(),
        service_id: host.service_id.clone(),
        external_id: RepoId::from(
            args.node_id
                .clone()
                .unwrap_or_else(|| args.name_with_owner.clone()),
        ),
    }
}

/// Partial results are never persisted; say how far the fetch got.
fn report_partial<T>(
    err: FetchError<T>,
    count: impl Fn(&T) -> usize,
    noun: &str,
) -> Box<dyn std::error::Error> {
    let (partial, error) = err.into_parts();
    if let Some(partial) = partial {
        eprintln!(
            "{} fetch stopped after {} {}; nothing was saved",
            style("warning:").yellow(),
            count(&partial),
            noun
        );
    }
    Box::new(error)
}
