//! SQLite persistence, the scrape log, and HTTP fetch utilities for statscrape.

mod http;
mod scrape_log;
mod store;

pub use http::{FetchError, Fetcher, HttpClientConfig, HttpFetcher, RetryPolicy, DEFAULT_USER_AGENT};
pub use scrape_log::{ScrapeLog, ScrapeLogEntry, SCRAPE_LOG_TABLE};
pub use store::{
    QueryResult, SqliteStore, StoreError, PROTECTED_COLUMN_NAMES, PROTECTED_COLUMN_PREFIX,
    REFERENCE_TABLES,
};

pub const CRATE_NAME: &str = "statscrape-storage";
