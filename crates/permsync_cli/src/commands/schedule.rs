use std::sync::Arc;

use console::style;
use permsync::cleaner::JobHistoryCleaner;
use permsync::codehost::short_error_message;
use permsync::groups_cache::delete_expired;
use permsync::scheduler::SyncScheduler;
use permsync::{DbJobStore, DbPermsStore};
use sea_orm::DatabaseConnection;

use crate::config::Config;
use crate::shutdown::{is_shutdown_requested, sleep_unless_shutdown};

fn scheduler(config: &Config, db: &Arc<DatabaseConnection>) -> SyncScheduler {
    SyncScheduler::new(
        Arc::new(DbPermsStore::new(Arc::clone(db))),
        Arc::new(DbJobStore::new(Arc::clone(db))),
        config.sync.scheduler_options(),
    )
}

fn cleaner(config: &Config, db: &Arc<DatabaseConnection>) -> JobHistoryCleaner {
    JobHistoryCleaner::new(
        Arc::new(DbJobStore::new(Arc::clone(db))),
        config.sync.cleaner_options(),
    )
}

/// Run one scheduling pass.
pub(crate) async fn handle_schedule(
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> Result<(), Box<dyn std::error::Error>> {
    let stats = scheduler(config, db).run_once().await?;

    println!(
        "{} Scheduled {} sync jobs ({} users without permissions, {} repositories without \
         permissions, {} outdated users, {} outdated repositories); {} already in flight.",
        style("✓").green(),
        stats.scheduled(),
        stats.users_no_perms,
        stats.repos_no_perms,
        stats.users_outdated,
        stats.repos_outdated,
        stats.skipped
    );
    Ok(())
}

/// Run one history cleanup pass.
pub(crate) async fn handle_clean(
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> Result<(), Box<dyn std::error::Error>> {
    let deleted = cleaner(config, db).run_once().await?;
    let expired = delete_expired(db, chrono::Utc::now()).await?;

    println!(
        "{} Deleted {} finished jobs beyond the last {} per subject and {} expired cache entries.",
        style("✓").green(),
        deleted,
        config.sync.history_size,
        expired
    );
    Ok(())
}

/// Schedule and clean every interval until Ctrl+C.
///
/// A failed pass is logged and retried on the next tick.
pub(crate) async fn handle_run(
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = scheduler(config, db);
    let cleaner = cleaner(config, db);
    let interval = scheduler.options().interval;

    tracing::info!(
        interval_secs = interval.as_secs(),
        history_size = cleaner.options().history_size,
        "Starting permission sync scheduler"
    );

    let mut passes: u64 = 0;
    while !is_shutdown_requested() {
        passes += 1;

        if let Err(e) = scheduler.run_once().await {
            tracing::error!(pass = passes, "Scheduling pass failed: {}", short_error_message(&e));
        }
        if let Err(e) = cleaner.run_once().await {
            tracing::error!(pass = passes, "History cleanup failed: {}", short_error_message(&e));
        }
        match delete_expired(db, chrono::Utc::now()).await {
            Ok(0) => {}
            Ok(n) => tracing::debug!(expired = n, "Purged expired groups cache entries"),
            Err(e) => tracing::warn!("Failed to purge expired groups cache entries: {}", e),
        }

        if !sleep_unless_shutdown(interval).await {
            break;
        }
    }

    tracing::info!(passes, "Scheduler stopped");
    Ok(())
}
