//! Initial migration: groups cache, sync jobs and permission state tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_groups_cache(manager).await?;
        self.create_permission_sync_jobs(manager).await?;
        self.create_permission_states(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PermissionStates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PermissionSyncJobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GroupsCache::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_groups_cache(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GroupsCache::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GroupsCache::CacheKey)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(GroupsCache::Value).binary().not_null())
                    .col(
                        ColumnDef::new(GroupsCache::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GroupsCache::CachedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Expiry sweeps
        manager
            .create_index(
                Index::create()
                    .name("idx_groups_cache_expires_at")
                    .table(GroupsCache::Table)
                    .col(GroupsCache::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_permission_sync_jobs(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PermissionSyncJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PermissionSyncJobs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PermissionSyncJobs::State)
                            .string()
                            .not_null()
                            .default("queued"),
                    )
                    .col(ColumnDef::new(PermissionSyncJobs::Reason).string().not_null())
                    .col(
                        ColumnDef::new(PermissionSyncJobs::Priority)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    // Subject
                    .col(ColumnDef::new(PermissionSyncJobs::UserId).integer().null())
                    .col(
                        ColumnDef::new(PermissionSyncJobs::RepositoryId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PermissionSyncJobs::TriggeredByUserId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PermissionSyncJobs::InvalidateCaches)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PermissionSyncJobs::NoPerms)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PermissionSyncJobs::FailureMessage)
                            .text()
                            .null(),
                    )
                    // Lifecycle timestamps
                    .col(
                        ColumnDef::new(PermissionSyncJobs::QueuedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(PermissionSyncJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PermissionSyncJobs::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PermissionSyncJobs::ProcessAfter)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PermissionSyncJobs::NumResets)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PermissionSyncJobs::NumFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    // Cancellation
                    .col(
                        ColumnDef::new(PermissionSyncJobs::Cancel)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PermissionSyncJobs::CancellationReason)
                            .text()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_permission_sync_jobs_user_state")
                    .table(PermissionSyncJobs::Table)
                    .col(PermissionSyncJobs::UserId)
                    .col(PermissionSyncJobs::State)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_permission_sync_jobs_repo_state")
                    .table(PermissionSyncJobs::Table)
                    .col(PermissionSyncJobs::RepositoryId)
                    .col(PermissionSyncJobs::State)
                    .to_owned(),
            )
            .await?;

        // Queue ordering
        manager
            .create_index(
                Index::create()
                    .name("idx_permission_sync_jobs_queue")
                    .table(PermissionSyncJobs::Table)
                    .col(PermissionSyncJobs::State)
                    .col((PermissionSyncJobs::Priority, IndexOrder::Desc))
                    .col(PermissionSyncJobs::QueuedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_permission_states(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PermissionStates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PermissionStates::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PermissionStates::SubjectType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PermissionStates::SubjectId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PermissionStates::ObjectIds)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(
                        ColumnDef::new(PermissionStates::SyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PermissionStates::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per subject
        manager
            .create_index(
                Index::create()
                    .name("idx_permission_states_subject")
                    .table(PermissionStates::Table)
                    .col(PermissionStates::SubjectType)
                    .col(PermissionStates::SubjectId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_permission_states_synced")
                    .table(PermissionStates::Table)
                    .col(PermissionStates::SubjectType)
                    .col(PermissionStates::SyncedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "groups_cache")]
enum GroupsCache {
    Table,
    CacheKey,
    Value,
    ExpiresAt,
    CachedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "permission_sync_jobs")]
enum PermissionSyncJobs {
    Table,
    Id,
    State,
    Reason,
    Priority,
    UserId,
    RepositoryId,
    TriggeredByUserId,
    InvalidateCaches,
    NoPerms,
    FailureMessage,
    QueuedAt,
    StartedAt,
    FinishedAt,
    ProcessAfter,
    NumResets,
    NumFailures,
    Cancel,
    CancellationReason,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "permission_states")]
enum PermissionStates {
    Table,
    Id,
    SubjectType,
    SubjectId,
    ObjectIds,
    SyncedAt,
    UpdatedAt,
}
