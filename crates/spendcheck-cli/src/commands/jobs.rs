//! Notification job command

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use spendcheck_core::{AIClient, Database, JobKind, JobReport, NotificationJobs, PushClient};

pub async fn cmd_jobs(db: Database, job: &str, user: Option<&str>) -> Result<()> {
    let push = PushClient::from_env();
    if !push.is_enabled() {
        println!("⚠️  Push notifications are disabled; sends will be counted as failures");
    }
    let ai = AIClient::from_env();
    if ai.is_none() {
        println!("   AI backend not configured, using fallback advice text");
    }

    let jobs = NotificationJobs::new(db, ai, push);
    let reports = run_jobs(&jobs, job, user, Utc::now()).await?;

    println!();
    println!(
        "{:<20} {:>8} {:>8} {:>6} {:>9}",
        "JOB", "CHECKED", "SKIPPED", "SENT", "FAILURES"
    );
    println!("{}", "-".repeat(55));
    for report in &reports {
        println!(
            "{:<20} {:>8} {:>8} {:>6} {:>9}",
            report.job.as_str(),
            report.users_checked,
            report.users_skipped,
            report.notifications_sent,
            report.failures
        );
    }
    println!();

    Ok(())
}

/// Run one job or `all`, over every user or just `user`
pub async fn run_jobs(
    jobs: &NotificationJobs,
    job: &str,
    user: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<JobReport>> {
    let kinds: Vec<JobKind> = if job.eq_ignore_ascii_case("all") {
        JobKind::all().to_vec()
    } else {
        vec![job.parse::<JobKind>().context("Unknown job")?]
    };

    let mut reports = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let report = match user {
            Some(uid) => jobs.run_for_user(kind, uid, now).await?,
            None => jobs.run(kind, now).await?,
        };
        reports.push(report);
    }
    Ok(reports)
}
