use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{is_canonical_date, translate_date, ScrapeError};

pub const GAME_DATE_COLUMN: &str = "GAME_DATE";

/// Header row plus rectangular data rows taken from one API result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResponse {
    column_names: Vec<String>,
    rows: Vec<Vec<JsonValue>>,
}

impl NormalizedResponse {
    /// Builds a response, rejecting duplicate column names and ragged rows.
    pub fn new(column_names: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Result<Self, ScrapeError> {
        let duplicate = {
            let mut seen = HashSet::with_capacity(column_names.len());
            column_names
                .iter()
                .find(|c| !seen.insert(c.as_str()))
                .cloned()
        };
        if let Some(dup) = duplicate {
            return Err(ScrapeError::malformed(format!("duplicate column {dup}")));
        }
        if let Some((r, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != column_names.len())
        {
            return Err(ScrapeError::malformed(format!(
                "row {r} has {} values for {} columns",
                row.len(),
                column_names.len()
            )));
        }
        Ok(Self { column_names, rows })
    }

    /// Extracts `resultSets[result_set_index]` from a raw payload, upper-cases
    /// headers, drops globally excluded columns and canonicalizes `GAME_DATE`.
    pub fn from_payload(
        payload: &JsonValue,
        result_set_index: usize,
        excluded: &BTreeSet<String>,
    ) -> Result<Self, ScrapeError> {
        let result_set = payload
            .get("resultSets")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| ScrapeError::malformed("missing resultSets array"))?
            .get(result_set_index)
            .ok_or_else(|| {
                ScrapeError::malformed(format!("no result set at index {result_set_index}"))
            })?;
        let headers = result_set
            .get("headers")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| ScrapeError::malformed("result set has no headers"))?;
        let row_set = result_set
            .get("rowSet")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| ScrapeError::malformed("result set has no rowSet"))?;

        let headers = headers
            .iter()
            .map(|h| {
                h.as_str()
                    .map(str::to_uppercase)
                    .ok_or_else(|| ScrapeError::malformed(format!("non-string header {h}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let keep: Vec<usize> = (0..headers.len())
            .filter(|&i| !excluded.contains(&headers[i]))
            .collect();

        let mut rows = Vec::with_capacity(row_set.len());
        for (r, row) in row_set.iter().enumerate() {
            let row = row
                .as_array()
                .ok_or_else(|| ScrapeError::malformed(format!("row {r} is not an array")))?;
            if row.len() != headers.len() {
                return Err(ScrapeError::malformed(format!(
                    "row {r} has {} values for {} headers",
                    row.len(),
                    headers.len()
                )));
            }
            rows.push(keep.iter().map(|&i| row[i].clone()).collect());
        }
        let column_names = keep.iter().map(|&i| headers[i].clone()).collect();

        let mut response = Self::new(column_names, rows)?;
        response.canonicalize_game_dates()?;
        Ok(response)
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn rows(&self) -> &[Vec<JsonValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Appends a column and back-fills every row with `value`.
    pub fn add_column(&mut self, name: impl Into<String>, value: JsonValue) -> Result<(), ScrapeError> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(ScrapeError::malformed(format!("duplicate column {name}")));
        }
        self.column_names.push(name);
        for row in &mut self.rows {
            row.push(value.clone());
        }
        Ok(())
    }

    fn canonicalize_game_dates(&mut self) -> Result<(), ScrapeError> {
        let Some(idx) = self.column_index(GAME_DATE_COLUMN) else {
            return Ok(());
        };
        let needs_rewrite = self
            .rows
            .first()
            .and_then(|row| row[idx].as_str())
            .is_some_and(|date| !is_canonical_date(date));
        if !needs_rewrite {
            return Ok(());
        }

        for row in &mut self.rows {
            let translated = match row[idx].as_str() {
                Some(raw) => translate_date(raw).map_err(|_| {
                    ScrapeError::malformed(format!("unrecognized {GAME_DATE_COLUMN} {raw:?}"))
                })?,
                None => continue,
            };
            row[idx] = JsonValue::String(translated);
        }
        Ok(())
    }
}
