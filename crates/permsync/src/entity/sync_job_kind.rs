//! Enumerations stored on permission sync job rows.

use sea_orm::Iterable;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a permission sync job.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[sea_orm(string_value = "queued")]
    #[default]
    Queued,
    #[sea_orm(string_value = "processing")]
    Processing,
    /// Failed but eligible for a retry by the worker.
    #[sea_orm(string_value = "errored")]
    Errored,
    /// Failed permanently.
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "canceled")]
    Canceled,
}

impl JobState {
    /// States counted by history retention.
    pub const TERMINAL: [JobState; 3] = [JobState::Completed, JobState::Errored, JobState::Failed];

    /// States that block scheduling of an equal-or-lower priority job.
    pub const IN_FLIGHT: [JobState; 2] = [JobState::Queued, JobState::Processing];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    pub fn is_in_flight(self) -> bool {
        Self::IN_FLIGHT.contains(&self)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Errored => "errored",
            JobState::Failed => "failed",
            JobState::Completed => "completed",
            JobState::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Scheduling priority. Ordered `Low < Medium < High`.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    #[sea_orm(num_value = 0)]
    #[default]
    Low,
    #[sea_orm(num_value = 5)]
    Medium,
    #[sea_orm(num_value = 10)]
    High,
}

impl std::fmt::Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPriority::Low => f.write_str("LOW"),
            JobPriority::Medium => f.write_str("MEDIUM"),
            JobPriority::High => f.write_str("HIGH"),
        }
    }
}

/// Why a job was enqueued.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum JobReason {
    // Scheduler
    #[sea_orm(string_value = "REASON_USER_OUTDATED_PERMS")]
    UserOutdatedPermissions,
    #[sea_orm(string_value = "REASON_USER_NO_PERMS")]
    UserNoPermissions,
    #[sea_orm(string_value = "REASON_REPO_OUTDATED_PERMS")]
    RepoOutdatedPermissions,
    #[sea_orm(string_value = "REASON_REPO_NO_PERMS")]
    RepoNoPermissions,
    #[sea_orm(string_value = "REASON_REPO_UPDATED_FROM_CODE_HOST")]
    RepoUpdatedFromCodeHost,

    // Platform events
    #[sea_orm(string_value = "REASON_USER_EMAIL_REMOVED")]
    UserEmailRemoved,
    #[sea_orm(string_value = "REASON_USER_EMAIL_VERIFIED")]
    UserEmailVerified,
    #[sea_orm(string_value = "REASON_USER_ADDED")]
    UserAdded,
    #[sea_orm(string_value = "REASON_USER_ADDED_TO_ORG")]
    UserAddedToOrg,
    #[sea_orm(string_value = "REASON_USER_REMOVED_FROM_ORG")]
    UserRemovedFromOrg,
    #[sea_orm(string_value = "REASON_USER_ACCEPTED_ORG_INVITE")]
    UserAcceptedOrgInvite,
    #[sea_orm(string_value = "REASON_EXTERNAL_ACCOUNT_ADDED")]
    ExternalAccountAdded,
    #[sea_orm(string_value = "REASON_EXTERNAL_ACCOUNT_DELETED")]
    ExternalAccountDeleted,

    // Code host webhooks
    #[sea_orm(string_value = "REASON_GITHUB_USER_EVENT")]
    GitHubUserEvent,
    #[sea_orm(string_value = "REASON_GITHUB_USER_ADDED_EVENT")]
    GitHubUserAddedEvent,
    #[sea_orm(string_value = "REASON_GITHUB_USER_REMOVED_EVENT")]
    GitHubUserRemovedEvent,
    #[sea_orm(string_value = "REASON_GITHUB_USER_MEMBERSHIP_ADDED_EVENT")]
    GitHubUserMembershipAddedEvent,
    #[sea_orm(string_value = "REASON_GITHUB_USER_MEMBERSHIP_REMOVED_EVENT")]
    GitHubUserMembershipRemovedEvent,
    #[sea_orm(string_value = "REASON_GITHUB_TEAM_ADDED_TO_REPO_EVENT")]
    GitHubTeamAddedToRepoEvent,
    #[sea_orm(string_value = "REASON_GITHUB_TEAM_REMOVED_FROM_REPO_EVENT")]
    GitHubTeamRemovedFromRepoEvent,
    #[sea_orm(string_value = "REASON_GITHUB_ORG_MEMBER_ADDED_EVENT")]
    GitHubOrgMemberAddedEvent,
    #[sea_orm(string_value = "REASON_GITHUB_ORG_MEMBER_REMOVED_EVENT")]
    GitHubOrgMemberRemovedEvent,
    #[sea_orm(string_value = "REASON_GITHUB_REPO_EVENT")]
    GitHubRepoEvent,
    #[sea_orm(string_value = "REASON_GITHUB_REPO_MADE_PRIVATE_EVENT")]
    GitHubRepoMadePrivateEvent,

    // Administrator triggered
    #[sea_orm(string_value = "REASON_MANUAL_REPO_SYNC")]
    ManualRepoSync,
    #[sea_orm(string_value = "REASON_MANUAL_USER_SYNC")]
    ManualUserSync,
}

/// Coarse classification of [`JobReason`] used for filtering job listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReasonGroup {
    Manual,
    Webhook,
    Schedule,
    Platform,
    Unknown,
}

impl JobReason {
    pub fn group(self) -> ReasonGroup {
        use JobReason::*;
        match self {
            ManualRepoSync | ManualUserSync => ReasonGroup::Manual,
            GitHubUserEvent
            | GitHubUserAddedEvent
            | GitHubUserRemovedEvent
            | GitHubUserMembershipAddedEvent
            | GitHubUserMembershipRemovedEvent
            | GitHubTeamAddedToRepoEvent
            | GitHubTeamRemovedFromRepoEvent
            | GitHubOrgMemberAddedEvent
            | GitHubOrgMemberRemovedEvent
            | GitHubRepoEvent
            | GitHubRepoMadePrivateEvent => ReasonGroup::Webhook,
            UserOutdatedPermissions
            | UserNoPermissions
            | RepoOutdatedPermissions
            | RepoNoPermissions
            | RepoUpdatedFromCodeHost => ReasonGroup::Schedule,
            UserEmailRemoved
            | UserEmailVerified
            | UserAddedToOrg
            | UserRemovedFromOrg
            | UserAcceptedOrgInvite => ReasonGroup::Platform,
            UserAdded | ExternalAccountAdded | ExternalAccountDeleted => ReasonGroup::Unknown,
        }
    }
}

impl ReasonGroup {
    /// Every reason belonging to this group.
    pub fn reasons(self) -> Vec<JobReason> {
        JobReason::iter().filter(|r| r.group() == self).collect()
    }
}
