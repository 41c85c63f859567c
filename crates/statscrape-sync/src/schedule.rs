use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::{RunMode, ScrapeConfig};
use crate::run_once;

/// Scheduler that performs a daily run on `config.scheduler_cron`.
pub async fn build_daily_scheduler(config: ScrapeConfig, jobs_path: PathBuf) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let cron = config.scheduler_cron.clone();
    let config = Arc::new(config);
    let jobs_path = Arc::new(jobs_path);

    let job = Job::new_async(&cron, move |_uuid, _l| {
        let config = Arc::clone(&config);
        let jobs_path = Arc::clone(&jobs_path);
        Box::pin(async move {
            match run_once(&config, &jobs_path, RunMode::Daily).await {
                Ok(summary) => info!(
                    run_id = %summary.run_id,
                    issued = summary.issued,
                    stored_rows = summary.stored_rows,
                    "scheduled daily run finished"
                ),
                Err(err) => error!(error = %format!("{err:#}"), "scheduled daily run failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(sched)
}

/// Starts the daily scheduler and blocks until Ctrl-C.
pub async fn run_scheduler_until_ctrl_c(config: ScrapeConfig, jobs_path: PathBuf) -> Result<()> {
    let cron = config.scheduler_cron.clone();
    let mut sched = build_daily_scheduler(config, jobs_path).await?;
    sched.start().await.context("starting scheduler")?;
    info!(%cron, "scheduler running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("shutting down scheduler");
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn default_cron_builds_a_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        let result = build_daily_scheduler(ScrapeConfig::default(), dir.path().join("jobs.yaml")).await;
        assert!(result.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_cron_is_rejected() {
        let config = ScrapeConfig {
            scheduler_cron: "every morning".to_string(),
            ..ScrapeConfig::default()
        };
        let Err(err) = build_daily_scheduler(config, PathBuf::from("jobs.yaml")).await else {
            panic!("cron expression should have been rejected");
        };
        assert!(format!("{err:#}").contains("every morning"));
    }
}
