//! Database connection utilities.

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

/// Pragmas applied to file-backed SQLite databases.
const SQLITE_PRAGMAS: [&str; 3] = [
    "PRAGMA journal_mode=WAL",
    "PRAGMA busy_timeout=5000",
    "PRAGMA synchronous=NORMAL",
];

async fn configure_sqlite(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    for pragma in SQLITE_PRAGMAS {
        db.execute(Statement::from_string(backend, pragma.to_string()))
            .await?;
    }
    Ok(())
}

async fn open(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;
    if database_url.starts_with("sqlite://") {
        configure_sqlite(&db).await?;
    }
    Ok(db)
}

/// Establish a connection to the database.
///
/// # Arguments
/// * `database_url` - e.g. `sqlite://permsync.db?mode=rwc` or `postgres:///permsync`
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    open(database_url).await
}

/// Establish a connection and run all pending migrations.
///
/// # Example
/// ```ignore
/// let db = permsync::connect_and_migrate("sqlite::memory:").await?;
/// ```
#[cfg(feature = "migrate")]
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    use sea_orm_migration::MigratorTrait;

    let db = open(database_url).await?;
    crate::migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn configure_sqlite_runs_every_pragma() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results(SQLITE_PRAGMAS.map(|_| MockExecResult {
                rows_affected: 0,
                last_insert_id: 0,
            }))
            .into_connection();

        configure_sqlite(&db)
            .await
            .expect("mock sqlite pragma execs should succeed");

        let log = db.into_transaction_log();
        assert_eq!(log.len(), SQLITE_PRAGMAS.len());
    }

    #[tokio::test]
    async fn connect_rejects_unknown_scheme() {
        let err = connect("not-a-database-url")
            .await
            .expect_err("invalid URL should error");
        assert!(!err.to_string().is_empty());
    }
}
