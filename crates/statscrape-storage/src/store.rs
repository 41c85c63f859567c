use std::collections::BTreeSet;
use std::str::FromStr;

use serde_json::Value as JsonValue;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, ValueRef};
use statscrape_core::{DuplicatePolicy, NormalizedResponse, ScrapeError};
use thiserror::Error;
use tracing::debug;

use crate::SCRAPE_LOG_TABLE;

/// Column names that collide with SQL keywords; stored with a prefix.
pub const PROTECTED_COLUMN_NAMES: &[&str] = &["TO"];
pub const PROTECTED_COLUMN_PREFIX: &str = "NBA_";

/// Bookkeeping tables hidden from `table_names(true)`.
pub const REFERENCE_TABLES: &[&str] = &[SCRAPE_LOG_TABLE, "player_ids", "game_dates", "games"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("row {row} of {table} has {found} values for {expected} columns")]
    RowWidth {
        table: String,
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("cannot create {0} without columns")]
    NoColumns(String),
    #[error("unparseable scrape log timestamp {0:?}")]
    Timestamp(String),
}

impl From<StoreError> for ScrapeError {
    fn from(err: StoreError) -> Self {
        ScrapeError::Storage(Box::new(err))
    }
}

/// Column names plus rows returned by an ad-hoc query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

/// Relational store backed by a single-connection SQLite pool. One
/// connection keeps writes serialized, which is all the scraper needs.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `database_url` and
    /// ensures the scrape log table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_db().await?;
        Ok(store)
    }

    /// Private in-memory database; lives as long as the pool's one connection.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_db().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init_db(&self) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {SCRAPE_LOG_TABLE} (date TEXT, api_request TEXT, table_name TEXT)"
        ))
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {SCRAPE_LOG_TABLE}_api_request ON {SCRAPE_LOG_TABLE} (api_request)"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn exists_table(&self, name: &str) -> Result<bool, StoreError> {
        let found = sqlx::query("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Table names in alphabetical order; `only_data` hides bookkeeping tables.
    pub async fn table_names(&self, only_data: bool) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0)?;
            if !(only_data && REFERENCE_TABLES.contains(&name.as_str())) {
                names.push(name);
            }
        }
        Ok(names)
    }

    pub async fn column_names(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table)))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(StoreError::from))
            .collect()
    }

    /// Creates `table` with column types inferred from the first non-null
    /// value of each column, then inserts `rows`.
    pub async fn create_and_insert(
        &self,
        table: &str,
        column_names: &[String],
        rows: &[Vec<JsonValue>],
        primary_keys: &[String],
        policy: DuplicatePolicy,
    ) -> Result<u64, StoreError> {
        if column_names.is_empty() {
            return Err(StoreError::NoColumns(table.to_string()));
        }
        check_row_widths(table, column_names, rows)?;
        let mut defs: Vec<String> = column_names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{} {}", quote_ident(name), column_type(rows, i)))
            .collect();
        if !primary_keys.is_empty() {
            let keys: Vec<String> = primary_keys.iter().map(|k| quote_ident(k)).collect();
            defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table),
            defs.join(", ")
        );
        debug!(table, sql = %sql, "creating table");
        sqlx::query(&sql).execute(&self.pool).await?;

        self.insert_rows(table, column_names, rows, policy).await
    }

    /// Inserts `rows` in one transaction. Returns the number of rows affected.
    pub async fn insert_rows(
        &self,
        table: &str,
        column_names: &[String],
        rows: &[Vec<JsonValue>],
        policy: DuplicatePolicy,
    ) -> Result<u64, StoreError> {
        check_row_widths(table, column_names, rows)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let columns: Vec<String> = column_names.iter().map(|c| quote_ident(c)).collect();
        let marks = vec!["?"; column_names.len()].join(", ");
        let sql = format!(
            "{} INTO {} ({}) VALUES ({})",
            insert_verb(policy),
            quote_ident(table),
            columns.join(", "),
            marks
        );

        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for values in rows {
            let query = values
                .iter()
                .fold(sqlx::query(&sql), |query, value| bind_json(query, value));
            affected += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    /// Stores a normalized response into `table`, creating it on first use.
    /// `ignore_keys` columns are dropped and protected names are prefixed.
    pub async fn store_response(
        &self,
        table: &str,
        response: &NormalizedResponse,
        primary_keys: &[String],
        ignore_keys: &BTreeSet<String>,
        policy: DuplicatePolicy,
    ) -> Result<u64, StoreError> {
        let keep: Vec<usize> = response
            .column_names()
            .iter()
            .enumerate()
            .filter(|(_, name)| !ignore_keys.contains(*name))
            .map(|(i, _)| i)
            .collect();
        let column_names: Vec<String> = keep
            .iter()
            .map(|&i| protect_column_name(&response.column_names()[i]))
            .collect();
        let rows: Vec<Vec<JsonValue>> = response
            .rows()
            .iter()
            .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
            .collect();
        let primary_keys: Vec<String> = primary_keys.iter().map(|k| protect_column_name(k)).collect();

        if self.exists_table(table).await? {
            self.insert_rows(table, &column_names, &rows, policy).await
        } else if rows.is_empty() {
            debug!(table, "empty response; table creation deferred");
            Ok(0)
        } else {
            self.create_and_insert(table, &column_names, &rows, &primary_keys, policy)
                .await
        }
    }

    /// Runs a statement that returns no rows, e.g. DDL.
    pub async fn execute(&self, sql: &str) -> Result<u64, StoreError> {
        Ok(sqlx::query(sql).execute(&self.pool).await?.rows_affected())
    }

    /// Runs an arbitrary query with positional `?` parameters.
    pub async fn query(&self, sql: &str, params: &[JsonValue]) -> Result<QueryResult, StoreError> {
        let query = params
            .iter()
            .fold(sqlx::query(sql), |query, value| bind_json(query, value));
        let rows = query.fetch_all(&self.pool).await?;

        let column_names = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => self
                .pool
                .describe(sql)
                .await?
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        };
        let rows = rows
            .iter()
            .map(|row| (0..row.columns().len()).map(|i| decode_cell(row, i)).collect())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(QueryResult { column_names, rows })
    }
}

fn insert_verb(policy: DuplicatePolicy) -> &'static str {
    match policy {
        DuplicatePolicy::Ignore => "INSERT OR IGNORE",
        DuplicatePolicy::Replace => "INSERT OR REPLACE",
        DuplicatePolicy::Fail => "INSERT",
    }
}

fn protect_column_name(name: &str) -> String {
    if PROTECTED_COLUMN_NAMES.contains(&name) {
        format!("{PROTECTED_COLUMN_PREFIX}{name}")
    } else {
        name.to_string()
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn check_row_widths(
    table: &str,
    column_names: &[String],
    rows: &[Vec<JsonValue>],
) -> Result<(), StoreError> {
    match rows
        .iter()
        .enumerate()
        .find(|(_, values)| values.len() != column_names.len())
    {
        Some((row, values)) => Err(StoreError::RowWidth {
            table: table.to_string(),
            row,
            found: values.len(),
            expected: column_names.len(),
        }),
        None => Ok(()),
    }
}

fn column_type(rows: &[Vec<JsonValue>], index: usize) -> &'static str {
    match rows.iter().filter_map(|row| row.get(index)).find(|v| !v.is_null()) {
        Some(JsonValue::Number(n)) if n.is_i64() || n.is_u64() => "INT",
        Some(JsonValue::Number(_)) => "FLOAT",
        Some(JsonValue::Bool(_)) => "INT",
        _ => "TEXT",
    }
}

fn bind_json<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &JsonValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        JsonValue::Null => query.bind(None::<String>),
        JsonValue::Bool(b) => query.bind(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        JsonValue::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn decode_cell(row: &SqliteRow, index: usize) -> Result<JsonValue, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Ok(JsonValue::from(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Ok(JsonValue::from(v));
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Ok(JsonValue::from(v));
    }
    let bytes: Vec<u8> = row.try_get(index)?;
    Ok(JsonValue::from(String::from_utf8_lossy(&bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statscrape_core::NormalizedResponse;

    fn team_log() -> NormalizedResponse {
        NormalizedResponse::from_payload(
            &json!({
                "resultSets": [{
                    "headers": ["SEASON_ID", "TEAM_ID", "GAME_DATE", "TO", "FG_PCT", "VIDEO_AVAILABLE"],
                    "rowSet": [
                        ["22017", 1610612756, "2018-02-04", 19, 0.532, 1],
                        ["22017", 1610612766, "2018-02-04", 8, 0.417, 1]
                    ]
                }]
            }),
            0,
            &BTreeSet::new(),
        )
        .unwrap()
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn init_creates_scrape_log() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.exists_table(SCRAPE_LOG_TABLE).await.unwrap());
        assert!(!store.exists_table("TABLE_NAME_THAT_DOES_NOT_EXIST").await.unwrap());
        assert_eq!(
            store.column_names(SCRAPE_LOG_TABLE).await.unwrap(),
            vec!["date", "api_request", "table_name"]
        );
    }

    #[tokio::test]
    async fn store_response_creates_typed_table_and_renames_protected_columns() {
        let store = SqliteStore::in_memory().await.unwrap();
        let ignore: BTreeSet<String> = ["VIDEO_AVAILABLE".to_string()].into();
        let stored = store
            .store_response(
                "team_logs",
                &team_log(),
                &keys(&["SEASON_ID", "TEAM_ID", "GAME_DATE"]),
                &ignore,
                DuplicatePolicy::Ignore,
            )
            .await
            .unwrap();
        assert_eq!(stored, 2);

        assert_eq!(
            store.column_names("team_logs").await.unwrap(),
            vec!["SEASON_ID", "TEAM_ID", "GAME_DATE", "NBA_TO", "FG_PCT"]
        );
        let types = store
            .query("SELECT name, type FROM pragma_table_info('team_logs')", &[])
            .await
            .unwrap();
        let types: Vec<_> = types.rows.iter().map(|r| r[1].clone()).collect();
        assert_eq!(types, vec![json!("TEXT"), json!("INT"), json!("TEXT"), json!("INT"), json!("FLOAT")]);

        let result = store
            .query("SELECT TEAM_ID, NBA_TO, FG_PCT FROM team_logs WHERE TEAM_ID = ?", &[json!(1610612756)])
            .await
            .unwrap();
        assert_eq!(result.column_names, vec!["TEAM_ID", "NBA_TO", "FG_PCT"]);
        assert_eq!(result.rows, vec![vec![json!(1610612756), json!(19), json!(0.532)]]);
    }

    #[tokio::test]
    async fn duplicate_policies_ignore_replace_and_fail() {
        let store = SqliteStore::in_memory().await.unwrap();
        let columns = keys(&["PLAYER_ID", "PTS"]);
        let pk = keys(&["PLAYER_ID"]);
        store
            .create_and_insert("box", &columns, &[vec![json!(1), json!(10)]], &pk, DuplicatePolicy::Ignore)
            .await
            .unwrap();

        let ignored = store
            .insert_rows("box", &columns, &[vec![json!(1), json!(99)]], DuplicatePolicy::Ignore)
            .await
            .unwrap();
        assert_eq!(ignored, 0);
        let pts = store.query("SELECT PTS FROM box", &[]).await.unwrap();
        assert_eq!(pts.rows, vec![vec![json!(10)]]);

        store
            .insert_rows("box", &columns, &[vec![json!(1), json!(42)]], DuplicatePolicy::Replace)
            .await
            .unwrap();
        let pts = store.query("SELECT PTS FROM box", &[]).await.unwrap();
        assert_eq!(pts.rows, vec![vec![json!(42)]]);

        let err = store
            .insert_rows("box", &columns, &[vec![json!(1), json!(0)]], DuplicatePolicy::Fail)
            .await;
        assert!(matches!(err, Err(StoreError::Sqlx(_))));
    }

    #[tokio::test]
    async fn ragged_rows_are_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store
            .create_and_insert(
                "t",
                &keys(&["A", "B"]),
                &[vec![json!(1), json!(2)], vec![json!(3)]],
                &[],
                DuplicatePolicy::Ignore,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RowWidth { row: 1, found: 1, expected: 2, .. }));
    }

    #[tokio::test]
    async fn short_row_after_null_is_rejected_before_creating_the_table() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store
            .create_and_insert(
                "t",
                &keys(&["A", "B"]),
                &[vec![json!(1), JsonValue::Null], vec![json!(3)]],
                &[],
                DuplicatePolicy::Ignore,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RowWidth { row: 1, found: 1, expected: 2, .. }));
        assert!(!store.exists_table("t").await.unwrap());
    }

    #[tokio::test]
    async fn empty_response_defers_table_creation() {
        let store = SqliteStore::in_memory().await.unwrap();
        let empty = NormalizedResponse::new(keys(&["A"]), vec![]).unwrap();
        let stored = store
            .store_response("later", &empty, &[], &BTreeSet::new(), DuplicatePolicy::Ignore)
            .await
            .unwrap();
        assert_eq!(stored, 0);
        assert!(!store.exists_table("later").await.unwrap());
    }

    #[tokio::test]
    async fn table_names_hide_reference_tables() {
        let store = SqliteStore::in_memory().await.unwrap();
        for table in ["player_ids", "player_logs"] {
            store
                .create_and_insert(table, &keys(&["PLAYER_ID"]), &[vec![json!(1)]], &[], DuplicatePolicy::Ignore)
                .await
                .unwrap();
        }
        assert_eq!(store.table_names(true).await.unwrap(), vec!["player_logs"]);
        assert_eq!(
            store.table_names(false).await.unwrap(),
            vec!["player_ids", "player_logs", SCRAPE_LOG_TABLE]
        );
    }

    #[tokio::test]
    async fn query_on_empty_table_still_reports_columns() {
        let store = SqliteStore::in_memory().await.unwrap();
        let result = store.query("SELECT * FROM scrape_log", &[]).await.unwrap();
        assert_eq!(result.column_names, vec!["date", "api_request", "table_name"]);
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn connect_creates_a_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.db");
        let url = format!("sqlite://{}", path.display());
        let store = SqliteStore::connect(&url).await.unwrap();
        assert!(store.exists_table(SCRAPE_LOG_TABLE).await.unwrap());
        assert!(path.exists());
    }
}
