//! Background scheduler for notification jobs
//!
//! Enabled via environment variables:
//!
//! - `SPENDCHECK_JOBS`: comma-separated jobs to run (`budget-limits`,
//!   `spending-change`, `income-vs-expense`, `forecast`, or `all`)
//! - `SPENDCHECK_JOB_INTERVAL_HOURS`: run every N hours; unset or 0 runs the
//!   jobs once, shortly after startup. Values above a year are capped.

use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use spendcheck_core::{JobKind, NotificationJobs};

/// Delay before a one-shot run, so the listener is up first
const ONE_SHOT_DELAY: Duration = Duration::from_secs(5);

/// Longest accepted interval (366 days)
const MAX_INTERVAL_HOURS: u64 = 24 * 366;

/// Configuration for scheduled notification jobs
#[derive(Debug, Clone, PartialEq)]
pub struct JobScheduleConfig {
    pub jobs: Vec<JobKind>,
    /// Hours between runs; 0 runs once
    pub interval_hours: u64,
}

impl JobScheduleConfig {
    /// Parse configuration from environment variables
    ///
    /// Returns None if scheduling is not configured (SPENDCHECK_JOBS not set or empty)
    pub fn from_env() -> Option<Self> {
        let jobs = parse_job_list(&std::env::var("SPENDCHECK_JOBS").ok()?);
        if jobs.is_empty() {
            warn!("SPENDCHECK_JOBS names no valid jobs, scheduler disabled");
            return None;
        }

        let mut interval_hours = std::env::var("SPENDCHECK_JOB_INTERVAL_HOURS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        if interval_hours > MAX_INTERVAL_HOURS {
            warn!(
                requested = interval_hours,
                max = MAX_INTERVAL_HOURS,
                "SPENDCHECK_JOB_INTERVAL_HOURS too large, capping"
            );
            interval_hours = MAX_INTERVAL_HOURS;
        }

        Some(Self {
            jobs,
            interval_hours,
        })
    }

    /// Time between runs, capped at `MAX_INTERVAL_HOURS`
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.interval_hours.min(MAX_INTERVAL_HOURS) * 3600)
    }
}

/// Parse a comma-separated job list; unknown names are logged and dropped
pub fn parse_job_list(input: &str) -> Vec<JobKind> {
    let mut jobs = Vec::new();
    for name in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if name.eq_ignore_ascii_case("all") {
            return JobKind::all().to_vec();
        }
        match name.parse::<JobKind>() {
            Ok(kind) if !jobs.contains(&kind) => jobs.push(kind),
            Ok(_) => {}
            Err(e) => warn!(job = name, error = %e, "Ignoring unknown job"),
        }
    }
    jobs
}

/// Start the job scheduler as a background task
pub fn start_job_scheduler(jobs: NotificationJobs, config: JobScheduleConfig) {
    let names: Vec<&str> = config.jobs.iter().map(JobKind::as_str).collect();

    if config.interval_hours == 0 {
        info!("Scheduling one-shot notification run: {}", names.join(", "));
        tokio::spawn(async move {
            tokio::time::sleep(ONE_SHOT_DELAY).await;
            run_scheduled_jobs(&jobs, &config.jobs).await;
        });
        return;
    }

    info!(
        "Starting job scheduler: {} every {} hours",
        names.join(", "),
        config.interval_hours
    );

    tokio::spawn(async move {
        let mut ticker = interval(config.period());

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            run_scheduled_jobs(&jobs, &config.jobs).await;
        }
    });
}

/// Run each job once, logging its report
async fn run_scheduled_jobs(jobs: &NotificationJobs, kinds: &[JobKind]) {
    for kind in kinds {
        info!(job = %kind, "Running scheduled job...");
        match jobs.run(*kind, Utc::now()).await {
            Ok(report) => info!(
                job = %kind,
                users_checked = report.users_checked,
                notifications_sent = report.notifications_sent,
                failures = report.failures,
                "Scheduled job completed"
            ),
            Err(e) => error!(job = %kind, error = %e, "Scheduled job failed"),
        }
    }
}
