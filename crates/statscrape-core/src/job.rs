use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{ScrapeError, Template};

/// What to do with a request that was already issued for the live season.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentSeasonPolicy {
    /// Issue the request unchanged and upsert the rows.
    Reissue,
    /// Move the request's `DateFrom` bound up to just before the last scrape.
    #[default]
    Narrow,
}

/// How inserts treat rows that collide with an existing primary key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    Ignore,
    Replace,
    Fail,
}

/// One configured scrape job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub template: Template,
    pub target_table: String,
    /// Upper-cased; missing ones are injected from the substitution.
    pub key_columns: Vec<String>,
    /// Dropped from the response before it is stored.
    pub excluded_columns: BTreeSet<String>,
    pub is_daily_variant: bool,
    pub result_set_index: usize,
    pub current_season_policy: Option<CurrentSeasonPolicy>,
    pub on_duplicate: Option<DuplicatePolicy>,
}

impl JobSpec {
    pub fn new(
        endpoint_template: &str,
        target_table: impl Into<String>,
        key_columns: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, ScrapeError> {
        let template = Template::parse(endpoint_template)?;
        template.check_season()?;
        Ok(Self {
            template,
            target_table: target_table.into(),
            key_columns: key_columns
                .into_iter()
                .map(|k| k.as_ref().trim().to_uppercase())
                .collect(),
            excluded_columns: BTreeSet::new(),
            is_daily_variant: false,
            result_set_index: 0,
            current_season_policy: None,
            on_duplicate: None,
        })
    }

    pub fn with_excluded_columns(
        mut self,
        columns: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        self.excluded_columns = columns
            .into_iter()
            .map(|c| c.as_ref().trim().to_uppercase())
            .collect();
        self
    }

    pub fn daily(mut self, is_daily_variant: bool) -> Self {
        self.is_daily_variant = is_daily_variant;
        self
    }

    pub fn with_result_set_index(mut self, index: usize) -> Self {
        self.result_set_index = index;
        self
    }

    pub fn with_current_season_policy(mut self, policy: CurrentSeasonPolicy) -> Self {
        self.current_season_policy = Some(policy);
        self
    }

    pub fn with_on_duplicate(mut self, policy: DuplicatePolicy) -> Self {
        self.on_duplicate = Some(policy);
        self
    }
}
