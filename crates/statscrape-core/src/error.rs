use thiserror::Error;

use crate::Placeholder;

/// Fatal conditions raised by the scrape engine. Only the fetch retry loop
/// recovers anything; every variant here aborts the run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("unsupported placeholder {{{name}}}")]
    UnsupportedPlaceholder { name: String },

    #[error("{{{placeholder}}} is season-dependent but the template has no {{SEASON}}")]
    MissingSeason { placeholder: Placeholder },

    #[error("no value for {{{placeholder}}} while rendering {template}")]
    UnresolvedPlaceholder {
        placeholder: Placeholder,
        template: String,
    },

    #[error("key column {key} is in neither the response nor the substitution for {url}")]
    MissingPrimaryKey { key: String, url: String },

    #[error("unable to fetch {url} after {attempts} attempts: {last_error}")]
    FetchExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("reference table {table} does not exist (needed to resolve {{{placeholder}}})")]
    MissingReferenceTable {
        table: String,
        placeholder: Placeholder,
    },

    #[error("unrecognized date {value:?}")]
    InvalidDate { value: String },

    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ScrapeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        ScrapeError::MalformedResponse {
            reason: reason.into(),
        }
    }
}
