//! Scrape orchestration: configuration, placeholder catalog, request
//! expansion, incremental planning, the job runner and the daily scheduler.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use statscrape_storage::{HttpFetcher, SqliteStore};
use tracing::info;

mod catalog;
mod config;
mod expand;
mod planner;
mod runner;
mod schedule;

pub use catalog::{ParamCatalog, ValueSet};
pub use config::{
    JobDescriptor, JobRegistry, RunMode, ScrapeConfig, DEFAULT_CONFIG_PATH, DEFAULT_JOBS_PATH,
    DEFAULT_SCHEDULER_CRON,
};
pub use expand::{expand, Expansion};
pub use planner::{IncrementalPlanner, PlanDecision, ScrapeState, NARROW_OVERLAP_DAYS};
pub use runner::{JobRunner, PlannedRequest, RunSummary, RunnerSettings};
pub use schedule::{build_daily_scheduler, run_scheduler_until_ctrl_c};

pub const CRATE_NAME: &str = "statscrape-sync";

pub async fn open_store(config: &ScrapeConfig) -> Result<SqliteStore> {
    SqliteStore::connect(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))
}

async fn build_runner(config: &ScrapeConfig, mode: RunMode) -> Result<JobRunner> {
    let store = open_store(config).await?;
    let fetcher = HttpFetcher::new(config.http_client_config())?;
    let settings = RunnerSettings::from_config(config, mode, Local::now().date_naive());
    Ok(JobRunner::new(store, Box::new(fetcher), settings))
}

/// Loads the job registry and performs one run against the live API.
pub async fn run_once(config: &ScrapeConfig, jobs_path: &Path, mode: RunMode) -> Result<RunSummary> {
    let registry = JobRegistry::load(jobs_path).await?;
    let runner = build_runner(config, mode).await?;
    info!(jobs = registry.jobs.len(), ?mode, "starting run");
    runner.run(&registry.jobs).await
}

/// Expands and plans without fetching anything.
pub async fn plan_once(
    config: &ScrapeConfig,
    jobs_path: &Path,
    mode: RunMode,
) -> Result<Vec<PlannedRequest>> {
    let registry = JobRegistry::load(jobs_path).await?;
    let runner = build_runner(config, mode).await?;
    runner.plan(&registry.jobs).await
}

/// Full run using `statscrape.yaml`, `jobs.yaml` and `STATSCRAPE_*` overrides.
pub async fn run_once_from_env() -> Result<RunSummary> {
    let config = ScrapeConfig::load_with_env(Path::new(DEFAULT_CONFIG_PATH)).await?;
    run_once(&config, Path::new(DEFAULT_JOBS_PATH), RunMode::Full).await
}
