use std::sync::Arc;

use clap::ValueEnum;
use console::style;
use permsync::entity::sync_job_kind::{JobReason, JobState, ReasonGroup};
use permsync::perms_store::{DbPermsStore, PermsStore};
use permsync::sync_jobs::{CreateJobOpts, ListJobsOptions};
use permsync::{DbJobStore, PermissionSyncJobModel, PermissionSyncJobStore};
use sea_orm::DatabaseConnection;

use crate::commands::shared::{OutputFormat, SubjectArg, print_json};

/// Enqueue a manual, high-priority sync for one subject.
pub(crate) async fn handle_enqueue(
    subject: SubjectArg,
    id: i32,
    invalidate_caches: bool,
    triggered_by: Option<i32>,
    db: &Arc<DatabaseConnection>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = DbJobStore::new(Arc::clone(db));

    let job = match subject {
        SubjectArg::User => {
            let opts = CreateJobOpts::manual(JobReason::ManualUserSync, triggered_by)
                .with_invalidate_caches(invalidate_caches);
            store.create_user_sync_job(id, opts).await?
        }
        SubjectArg::Repo => {
            let opts = CreateJobOpts::manual(JobReason::ManualRepoSync, triggered_by)
                .with_invalidate_caches(invalidate_caches);
            store.create_repo_sync_job(id, opts).await?
        }
    };

    match job {
        Some(job) => println!(
            "{} Queued job {} ({} priority)",
            style("✓").green(),
            job.id,
            job.priority
        ),
        None => println!(
            "{} A sync of equal or higher priority is already in flight",
            style("•").dim()
        ),
    }
    Ok(())
}

/// Record a subject so the scheduler picks it up as having no permissions.
pub(crate) async fn handle_register(
    subject: SubjectArg,
    ids: Vec<i32>,
    db: &Arc<DatabaseConnection>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = DbPermsStore::new(Arc::clone(db));

    let mut added = 0usize;
    for &id in &ids {
        let created = match subject {
            SubjectArg::User => store.register_user(id).await?,
            SubjectArg::Repo => store.register_repo(id).await?,
        };
        if created {
            added += 1;
        }
    }

    println!(
        "{} Registered {} of {} {}(s); {} already known",
        style("✓").green(),
        added,
        ids.len(),
        match subject {
            SubjectArg::User => "user",
            SubjectArg::Repo => "repository",
        },
        ids.len() - added
    );
    Ok(())
}

/// Job state filter for `jobs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum StateArg {
    Queued,
    Processing,
    Errored,
    Failed,
    Completed,
    Canceled,
}

impl From<StateArg> for JobState {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::Queued => JobState::Queued,
            StateArg::Processing => JobState::Processing,
            StateArg::Errored => JobState::Errored,
            StateArg::Failed => JobState::Failed,
            StateArg::Completed => JobState::Completed,
            StateArg::Canceled => JobState::Canceled,
        }
    }
}

/// Reason group filter for `jobs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ReasonGroupArg {
    Manual,
    Webhook,
    Schedule,
    Platform,
    Unknown,
}

impl From<ReasonGroupArg> for ReasonGroup {
    fn from(group: ReasonGroupArg) -> Self {
        match group {
            ReasonGroupArg::Manual => ReasonGroup::Manual,
            ReasonGroupArg::Webhook => ReasonGroup::Webhook,
            ReasonGroupArg::Schedule => ReasonGroup::Schedule,
            ReasonGroupArg::Platform => ReasonGroup::Platform,
            ReasonGroupArg::Unknown => ReasonGroup::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct JobsFilter {
    pub state: Option<StateArg>,
    pub user: Option<i32>,
    pub repo: Option<i32>,
    pub reason_group: Option<ReasonGroupArg>,
    pub limit: u64,
    pub offset: u64,
}

impl From<JobsFilter> for ListJobsOptions {
    fn from(filter: JobsFilter) -> Self {
        ListJobsOptions {
            state: filter.state.map(Into::into),
            user_id: filter.user,
            repository_id: filter.repo,
            reason_group: filter.reason_group.map(Into::into),
            limit: Some(filter.limit),
            offset: (filter.offset > 0).then_some(filter.offset),
            newest_first: true,
        }
    }
}

/// One row of the `jobs` listing.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct JobDisplay {
    #[tabled(rename = "ID")]
    pub id: i32,
    #[tabled(rename = "Subject")]
    pub subject: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
    #[tabled(rename = "Priority")]
    pub priority: String,
    #[tabled(rename = "Queued")]
    pub queued_at: String,
    #[tabled(rename = "Finished")]
    pub finished_at: String,
    #[tabled(rename = "Failures")]
    pub failures: i32,
    #[tabled(rename = "Message")]
    pub message: String,
}

impl From<&PermissionSyncJobModel> for JobDisplay {
    fn from(job: &PermissionSyncJobModel) -> Self {
        let format_time = |t: chrono::DateTime<chrono::FixedOffset>| {
            t.with_timezone(&chrono::Utc)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        };
        Self {
            id: job.id,
            subject: job
                .subject()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            state: job.state.to_string(),
            reason: format!("{:?}", job.reason),
            priority: job.priority.to_string(),
            queued_at: format_time(job.queued_at),
            finished_at: job.finished_at.map(format_time).unwrap_or_default(),
            failures: job.num_failures,
            message: job
                .failure_message
                .clone()
                .or_else(|| job.cancellation_reason.clone())
                .unwrap_or_default(),
        }
    }
}

/// List sync jobs, newest first.
pub(crate) async fn handle_jobs(
    filter: JobsFilter,
    output: OutputFormat,
    db: &Arc<DatabaseConnection>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = DbJobStore::new(Arc::clone(db));
    let jobs = store.list(filter.into()).await?;
    let rows: Vec<JobDisplay> = jobs.iter().map(JobDisplay::from).collect();

    match output {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table if rows.is_empty() => println!("No jobs found."),
        OutputFormat::Table => {
            let mut table = tabled::Table::new(rows);
            table.with(tabled::settings::Style::rounded());
            println!("{}", table);
        }
    }
    Ok(())
}
