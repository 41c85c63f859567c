use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::Row;

use crate::{SqliteStore, StoreError};

pub const SCRAPE_LOG_TABLE: &str = "scrape_log";

const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeLogEntry {
    pub date: DateTime<Utc>,
    pub api_request: String,
    pub table_name: String,
}

/// Append-only record of which request identities have been issued, and when.
#[derive(Debug, Clone)]
pub struct ScrapeLog {
    store: SqliteStore,
}

impl ScrapeLog {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    pub async fn record(&self, identity: &str, table: &str) -> Result<(), StoreError> {
        self.record_at(Utc::now(), identity, table).await
    }

    pub async fn record_at(
        &self,
        at: DateTime<Utc>,
        identity: &str,
        table: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO {SCRAPE_LOG_TABLE} (date, api_request, table_name) VALUES (?, ?, ?)"
        ))
        .bind(at.naive_utc().format(LOG_TIMESTAMP_FORMAT).to_string())
        .bind(identity)
        .bind(table)
        .execute(self.store.pool())
        .await?;
        Ok(())
    }

    pub async fn already_scraped(&self, identity: &str) -> Result<bool, StoreError> {
        let found = sqlx::query(&format!(
            "SELECT 1 FROM {SCRAPE_LOG_TABLE} WHERE api_request = ? LIMIT 1"
        ))
        .bind(identity)
        .fetch_optional(self.store.pool())
        .await?;
        Ok(found.is_some())
    }

    /// Most recent log timestamp for `identity`.
    pub async fn last_scraped(&self, identity: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT MAX(date) FROM {SCRAPE_LOG_TABLE} WHERE api_request = ?"
        ))
        .bind(identity)
        .fetch_one(self.store.pool())
        .await?;
        let raw: Option<String> = row.try_get(0)?;
        raw.map(|raw| parse_timestamp(&raw)).transpose()
    }

    pub async fn entries(&self) -> Result<Vec<ScrapeLogEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT date, api_request, table_name FROM {SCRAPE_LOG_TABLE} ORDER BY rowid"
        ))
        .fetch_all(self.store.pool())
        .await?;
        rows.iter()
            .map(|row| -> Result<ScrapeLogEntry, StoreError> {
                let date: String = row.try_get("date")?;
                Ok(ScrapeLogEntry {
                    date: parse_timestamp(&date)?,
                    api_request: row.try_get("api_request")?,
                    table_name: row.try_get("table_name")?,
                })
            })
            .collect()
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(raw, LOG_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| StoreError::Timestamp(raw.to_string()))
}
