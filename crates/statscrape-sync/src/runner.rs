use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use statscrape_core::{
    translate_date, ConcreteRequest, CurrentSeasonPolicy, DuplicatePolicy, JobSpec,
    NormalizedResponse, Placeholder, ScrapeError,
};
use statscrape_storage::{Fetcher, RetryPolicy, ScrapeLog, SqliteStore};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::catalog::ParamCatalog;
use crate::config::{RunMode, ScrapeConfig};
use crate::expand::expand;
use crate::planner::{IncrementalPlanner, PlanDecision};

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub mode: RunMode,
    pub seasons: Vec<String>,
    pub current_season: String,
    /// Daily runs resolve `DATE_TO` relative to this day.
    pub today: NaiveDate,
    pub retry: RetryPolicy,
    pub global_ignore_keys: BTreeSet<String>,
    pub on_duplicate: DuplicatePolicy,
    pub current_season_policy: CurrentSeasonPolicy,
}

impl RunnerSettings {
    pub fn from_config(config: &ScrapeConfig, mode: RunMode, today: NaiveDate) -> Self {
        Self {
            mode,
            seasons: config.seasons(),
            current_season: config.current_season.clone(),
            today,
            retry: config.retry_policy(),
            global_ignore_keys: config.global_ignore_keys.clone(),
            on_duplicate: config.on_duplicate,
            current_season_policy: config.current_season_policy,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub jobs: usize,
    pub generated: usize,
    pub skipped: usize,
    pub issued: usize,
    pub narrowed: usize,
    pub stored_rows: u64,
}

/// One entry of a dry-run plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRequest {
    pub table: String,
    pub decision: PlanDecision,
}

pub struct JobRunner {
    store: SqliteStore,
    planner: IncrementalPlanner,
    fetcher: Box<dyn Fetcher>,
    settings: RunnerSettings,
}

impl JobRunner {
    pub fn new(store: SqliteStore, fetcher: Box<dyn Fetcher>, settings: RunnerSettings) -> Self {
        let planner = IncrementalPlanner::new(
            ScrapeLog::new(store.clone()),
            settings.current_season.clone(),
        );
        Self {
            store,
            planner,
            fetcher,
            settings,
        }
    }

    pub fn log(&self) -> &ScrapeLog {
        self.planner.log()
    }

    fn catalog(&self) -> ParamCatalog {
        match self.settings.mode {
            RunMode::Full => ParamCatalog::new(
                self.store.clone(),
                self.settings.seasons.clone(),
                self.settings.current_season.clone(),
            ),
            RunMode::Daily => ParamCatalog::daily(
                self.store.clone(),
                self.settings.current_season.clone(),
                self.settings.today,
            ),
        }
    }

    /// Runs every job the mode includes, in order. Each request is fetched,
    /// stored, then logged; the first fatal error aborts the run.
    pub async fn run(&self, jobs: &[JobSpec]) -> Result<RunSummary> {
        let mut summary = RunSummary {
            run_id: Uuid::new_v4(),
            mode: self.settings.mode,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            jobs: 0,
            generated: 0,
            skipped: 0,
            issued: 0,
            narrowed: 0,
            stored_rows: 0,
        };
        self.check_jobs(jobs)?;
        let mut catalog = self.catalog();

        for job in jobs.iter().filter(|job| self.settings.mode.includes(job)) {
            summary.jobs += 1;
            let span = info_span!("job", run_id = %summary.run_id, table = %job.target_table);
            self.run_job(&mut catalog, job, &mut summary)
                .instrument(span)
                .await
                .with_context(|| format!("job for table {}", job.target_table))?;
        }

        summary.finished_at = Utc::now();
        info!(
            run_id = %summary.run_id,
            jobs = summary.jobs,
            issued = summary.issued,
            skipped = summary.skipped,
            stored_rows = summary.stored_rows,
            "run complete"
        );
        Ok(summary)
    }

    async fn run_job(
        &self,
        catalog: &mut ParamCatalog,
        job: &JobSpec,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let expansion = expand(catalog, &job.template).await?;
        info!(template = %job.template, requests = expansion.len(), "expanded job");
        summary.generated += expansion.len();

        let policy = job
            .current_season_policy
            .unwrap_or(self.settings.current_season_policy);
        for request in expansion.requests() {
            let decision = self.planner.plan(request?, policy).await?;
            let on_duplicate = match &decision {
                PlanDecision::Skip { identity } => {
                    debug!(identity = %identity, "already scraped; skipping");
                    summary.skipped += 1;
                    continue;
                }
                PlanDecision::Reissue(_) => job.on_duplicate.unwrap_or(DuplicatePolicy::Replace),
                PlanDecision::Narrowed { since, .. } => {
                    debug!(%since, "narrowed date range");
                    summary.narrowed += 1;
                    job.on_duplicate.unwrap_or(self.settings.on_duplicate)
                }
                PlanDecision::Issue(_) => job.on_duplicate.unwrap_or(self.settings.on_duplicate),
            };
            let Some(mut request) = decision.into_request() else {
                continue;
            };

            request.mark_issued(Utc::now());
            info!(url = %request.url, "issuing request");
            let payload = self.fetch_with_retry(&request.url).await?;
            summary.issued += 1;

            let mut response = NormalizedResponse::from_payload(
                &payload,
                job.result_set_index,
                &self.settings.global_ignore_keys,
            )
            .with_context(|| format!("normalizing {}", request.url))?;
            inject_key_columns(&mut response, job, &request)?;

            let stored = self
                .store
                .store_response(
                    &job.target_table,
                    &response,
                    &job.key_columns,
                    &job.excluded_columns,
                    on_duplicate,
                )
                .await
                .with_context(|| format!("storing rows from {}", request.url))?;
            summary.stored_rows += stored;

            let issued_at = request.issued_at.unwrap_or_else(Utc::now);
            self.log()
                .record_at(issued_at, &request.identity(), &job.target_table)
                .await
                .context("appending to scrape log")?;
        }
        Ok(())
    }

    /// Expands and plans every included job without fetching or writing.
    pub async fn plan(&self, jobs: &[JobSpec]) -> Result<Vec<PlannedRequest>> {
        self.check_jobs(jobs)?;
        let mut catalog = self.catalog();
        let mut planned = Vec::new();
        for job in jobs.iter().filter(|job| self.settings.mode.includes(job)) {
            let expansion = expand(&mut catalog, &job.template)
                .await
                .with_context(|| format!("job for table {}", job.target_table))?;
            let policy = job
                .current_season_policy
                .unwrap_or(self.settings.current_season_policy);
            for request in expansion.requests() {
                let decision = self.planner.plan(request?, policy).await?;
                planned.push(PlannedRequest {
                    table: job.target_table.clone(),
                    decision,
                });
            }
        }
        Ok(planned)
    }

    /// Rejects templates that can never expand, before any job is fetched.
    fn check_jobs(&self, jobs: &[JobSpec]) -> Result<()> {
        for job in jobs.iter().filter(|job| self.settings.mode.includes(job)) {
            job.template
                .check_season()
                .with_context(|| format!("job for table {}", job.target_table))?;
        }
        Ok(())
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<JsonValue, ScrapeError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .fetcher
                .fetch_json(url)
                .instrument(info_span!("http_fetch", url, attempt))
                .await;
            match result {
                Ok(payload) => return Ok(payload),
                Err(err) => match self.settings.retry.delay_after(attempt) {
                    Some(delay) => {
                        warn!(url, attempt, error = %err, "fetch failed; retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(ScrapeError::FetchExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            last_error: err.to_string(),
                        })
                    }
                },
            }
        }
    }
}

/// Adds key columns the response lacks, taking their values from the
/// substitution. `DATE_TO` is stored as a canonical date.
fn inject_key_columns(
    response: &mut NormalizedResponse,
    job: &JobSpec,
    request: &ConcreteRequest,
) -> Result<(), ScrapeError> {
    for key in &job.key_columns {
        if response.has_column(key) {
            continue;
        }
        let value = request
            .substitution
            .get_by_name(key)
            .ok_or_else(|| ScrapeError::MissingPrimaryKey {
                key: key.clone(),
                url: request.url.clone(),
            })?;
        let value = if key == Placeholder::DateTo.name() {
            JsonValue::String(translate_date(&value.to_string())?)
        } else {
            value.to_json()
        };
        response.add_column(key.clone(), value)?;
    }
    Ok(())
}
