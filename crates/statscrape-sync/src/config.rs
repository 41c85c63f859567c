use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use statscrape_core::{season_labels, CurrentSeasonPolicy, DuplicatePolicy, JobSpec};
use statscrape_storage::{HttpClientConfig, RetryPolicy, DEFAULT_USER_AGENT};
use tokio::fs;

pub const DEFAULT_CONFIG_PATH: &str = "statscrape.yaml";
pub const DEFAULT_JOBS_PATH: &str = "jobs.yaml";

/// Six-field cron (seconds first): every day at 09:00.
pub const DEFAULT_SCHEDULER_CRON: &str = "0 0 9 * * *";

const DEFAULT_IGNORE_KEYS: &[&str] = &[
    "VIDEO_AVAILABLE",
    "AST_PCT_RANK", "AST_RATIO_RANK", "AST_TO_RANK", "DEF_RATING_RANK", "DREB_PCT_RANK",
    "EFG_PCT_RANK", "FGA_PG_RANK", "FGA_RANK", "FGM_PG_RANK", "FGM_RANK", "FG_PCT_RANK",
    "GP_RANK", "L_RANK", "MIN_RANK", "NET_RATING_RANK", "OFF_RATING_RANK", "OREB_PCT_RANK",
    "PACE_RANK", "PCT_AST_RANK", "PCT_BLKA_RANK", "PCT_BLK_RANK", "PCT_DREB_RANK",
    "PCT_FG3A_RANK", "PCT_FG3M_RANK", "PCT_FGA_RANK", "PCT_FGM_RANK", "PCT_FTA_RANK",
    "PCT_FTM_RANK", "PCT_OREB_RANK", "PCT_PFD_RANK", "PCT_PF_RANK", "PCT_PTS_RANK",
    "PCT_REB_RANK", "PCT_STL_RANK", "PCT_TOV_RANK", "PIE_RANK", "REB_PCT_RANK",
    "TM_TOV_PCT_RANK", "TS_PCT_RANK", "USG_PCT_RANK", "W_PCT_RANK", "W_RANK",
];

/// Which jobs run and how date placeholders resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Full,
    Daily,
}

impl RunMode {
    /// Daily runs only include jobs flagged `daily`.
    pub fn includes(self, job: &JobSpec) -> bool {
        self == RunMode::Full || job.is_daily_variant
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub database_url: String,
    pub start_year: i32,
    pub end_year: i32,
    pub current_season: String,
    pub try_count: u32,
    pub sleep_secs: u64,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub global_ignore_keys: BTreeSet<String>,
    pub on_duplicate: DuplicatePolicy,
    pub current_season_policy: CurrentSeasonPolicy,
    pub scheduler_cron: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://statscrape.db".to_string(),
            start_year: 2013,
            end_year: 2018,
            current_season: "2017-18".to_string(),
            try_count: 5,
            sleep_secs: 2,
            http_timeout_secs: 20,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            global_ignore_keys: DEFAULT_IGNORE_KEYS.iter().map(|k| k.to_string()).collect(),
            on_duplicate: DuplicatePolicy::default(),
            current_season_policy: CurrentSeasonPolicy::default(),
            scheduler_cron: DEFAULT_SCHEDULER_CRON.to_string(),
        }
    }
}

impl ScrapeConfig {
    /// Reads the settings file, or the defaults when it does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !fs::try_exists(path)
            .await
            .with_context(|| format!("checking {}", path.display()))?
        {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// File settings, then `STATSCRAPE_*` environment overrides, then validation.
    pub async fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path).await?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("STATSCRAPE_DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(agent) = lookup("STATSCRAPE_USER_AGENT") {
            self.user_agent = agent;
        }
        if let Some(secs) = lookup("STATSCRAPE_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("STATSCRAPE_HTTP_TIMEOUT_SECS={secs:?} is not a number"))?;
        }
        if let Some(cron) = lookup("STATSCRAPE_SCHEDULER_CRON") {
            self.scheduler_cron = cron;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_year >= self.end_year {
            bail!(
                "start_year {} must be before end_year {}",
                self.start_year,
                self.end_year
            );
        }
        if self.current_season.trim().is_empty() {
            bail!("current_season must be set");
        }
        Ok(())
    }

    /// Season labels for `[start_year, end_year)`.
    pub fn seasons(&self) -> Vec<String> {
        season_labels(self.start_year, self.end_year)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.try_count.max(1),
            sleep: Duration::from_secs(self.sleep_secs),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RegistryFile {
    Wrapped { jobs: Vec<JobDescriptor> },
    Bare(Vec<JobDescriptor>),
}

/// One entry of the jobs file, before its template is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    #[serde(alias = "API_ENDPOINT")]
    pub endpoint: String,
    #[serde(alias = "DATA_NAME")]
    pub table: String,
    #[serde(default, alias = "PRIMARY_KEYS")]
    pub primary_keys: Vec<String>,
    #[serde(default, alias = "IGNORE_KEYS")]
    pub ignore_keys: Vec<String>,
    #[serde(default, alias = "RESULT_SET_INDEX")]
    pub result_set_index: usize,
    #[serde(default, alias = "DAILY_SCRAPE")]
    pub daily: bool,
    #[serde(default)]
    pub current_season_policy: Option<CurrentSeasonPolicy>,
    #[serde(default)]
    pub on_duplicate: Option<DuplicatePolicy>,
}

impl JobDescriptor {
    pub fn into_spec(self) -> Result<JobSpec> {
        let mut spec = JobSpec::new(&self.endpoint, &self.table, &self.primary_keys)
            .with_context(|| format!("job for table {}", self.table))?
            .with_excluded_columns(&self.ignore_keys)
            .with_result_set_index(self.result_set_index)
            .daily(self.daily);
        if let Some(policy) = self.current_season_policy {
            spec = spec.with_current_season_policy(policy);
        }
        if let Some(policy) = self.on_duplicate {
            spec = spec.with_on_duplicate(policy);
        }
        Ok(spec)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    pub jobs: Vec<JobSpec>,
}

impl JobRegistry {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(text).context("parsing job registry")?;
        let descriptors = match file {
            RegistryFile::Wrapped { jobs } => jobs,
            RegistryFile::Bare(jobs) => jobs,
        };
        let jobs = descriptors
            .into_iter()
            .map(JobDescriptor::into_spec)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { jobs })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))
    }
}
