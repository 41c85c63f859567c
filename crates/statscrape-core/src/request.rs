use chrono::{DateTime, NaiveDate, Utc};

use crate::{to_wire_date, Substitution};

/// Query parameter holding the lower bound of a request's date range.
pub const DATE_FROM_PARAM: &str = "DateFrom";

/// A fully rendered request plus the substitution that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteRequest {
    pub url: String,
    pub substitution: Substitution,
    /// Set when the request is actually sent, never at render time.
    pub issued_at: Option<DateTime<Utc>>,
}

impl ConcreteRequest {
    pub fn new(url: impl Into<String>, substitution: Substitution) -> Self {
        Self {
            url: url.into(),
            substitution,
            issued_at: None,
        }
    }

    pub fn season(&self) -> Option<&str> {
        self.substitution.season()
    }

    /// Log identity: the URL with its `DateFrom` value blanked, so a narrowed
    /// request maps to the same identity as the request it was derived from.
    pub fn identity(&self) -> String {
        request_identity(&self.url)
    }

    /// Copy of this request with `DateFrom` set to `since`. `None` when the
    /// URL carries no `DateFrom` parameter to rewrite.
    pub fn with_date_from(&self, since: NaiveDate) -> Option<ConcreteRequest> {
        let url = replace_query_value(&self.url, DATE_FROM_PARAM, &to_wire_date(since))?;
        Some(ConcreteRequest {
            url,
            substitution: self.substitution.clone(),
            issued_at: None,
        })
    }

    pub fn mark_issued(&mut self, at: DateTime<Utc>) {
        self.issued_at = Some(at);
    }
}

pub fn request_identity(url: &str) -> String {
    replace_query_value(url, DATE_FROM_PARAM, "").unwrap_or_else(|| url.to_string())
}

fn replace_query_value(url: &str, key: &str, value: &str) -> Option<String> {
    let (base, query) = url.split_once('?')?;
    let mut found = false;
    let rewritten = query
        .split('&')
        .map(|pair| {
            let name = pair.split_once('=').map_or(pair, |(name, _)| name);
            if name == key {
                found = true;
                format!("{key}={value}")
            } else {
                pair.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("&");
    found.then(|| format!("{base}?{rewritten}"))
}
