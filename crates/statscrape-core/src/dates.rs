//! Date and season formats used by the stats API and by stored tables.

use chrono::NaiveDate;

use crate::ScrapeError;

/// Form every stored date column is normalized to.
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Outbound query parameter form, `MM%2FDD%2FYYYY`.
pub const WIRE_DATE_FORMAT: &str = "%m%%2F%d%%2F%Y";

const SLASHED_DATE_FORMAT: &str = "%m/%d/%Y";

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

pub fn is_canonical_date(value: &str) -> bool {
    value.len() == 10 && NaiveDate::parse_from_str(value, CANONICAL_DATE_FORMAT).is_ok()
}

pub fn parse_canonical_date(value: &str) -> Result<NaiveDate, ScrapeError> {
    NaiveDate::parse_from_str(value, CANONICAL_DATE_FORMAT).map_err(|_| ScrapeError::InvalidDate {
        value: value.to_string(),
    })
}

/// Translates any known source date format into `YYYY-MM-DD`.
///
/// Accepted: `OCT 29, 2016`, `10/29/2016`, `10%2F29%2F2016`, and anything
/// whose first ten characters are already canonical (`2016-10-29T000001`).
pub fn translate_date(raw: &str) -> Result<String, ScrapeError> {
    let trimmed = raw.trim();

    if let Some(head) = trimmed.get(..10) {
        if NaiveDate::parse_from_str(head, CANONICAL_DATE_FORMAT).is_ok() {
            return Ok(head.to_string());
        }
    }

    if let Some(date) = parse_month_name_date(trimmed) {
        return Ok(date.format(CANONICAL_DATE_FORMAT).to_string());
    }

    let slashed = trimmed.replace("%2F", "/").replace("%2f", "/");
    NaiveDate::parse_from_str(&slashed, SLASHED_DATE_FORMAT)
        .map(|date| date.format(CANONICAL_DATE_FORMAT).to_string())
        .map_err(|_| ScrapeError::InvalidDate {
            value: raw.to_string(),
        })
}

pub fn to_wire_date(date: NaiveDate) -> String {
    date.format(WIRE_DATE_FORMAT).to_string()
}

/// The calendar day before a canonical date, in wire form.
pub fn day_before_wire(canonical: &str) -> Result<String, ScrapeError> {
    let date = parse_canonical_date(canonical)?;
    date.pred_opt()
        .map(to_wire_date)
        .ok_or_else(|| ScrapeError::InvalidDate {
            value: canonical.to_string(),
        })
}

/// `2017` -> `"2017-18"`; the end year is always two digits.
pub fn season_label(start_year: i32) -> String {
    format!("{}-{:02}", start_year, (start_year + 1).rem_euclid(100))
}

/// Labels for the half-open range `[start_year, end_year)`.
pub fn season_labels(start_year: i32, end_year: i32) -> Vec<String> {
    (start_year..end_year).map(season_label).collect()
}

// "MON DD, YYYY", month matched case-insensitively on its first three letters.
fn parse_month_name_date(value: &str) -> Option<NaiveDate> {
    let (month, rest) = value.split_once(' ')?;
    let (day, year) = rest.split_once(',')?;
    let month_prefix = month.get(..3)?.to_ascii_uppercase();
    let month_index = MONTH_ABBREVIATIONS.iter().position(|m| *m == month_prefix)?;
    let day: u32 = day.trim().parse().ok()?;
    let year: i32 = year.trim().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month_index as u32 + 1, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_known_source_formats() {
        assert_eq!(translate_date("OCT 29, 2016").unwrap(), "2016-10-29");
        assert_eq!(translate_date("11/10/2017").unwrap(), "2017-11-10");
        assert_eq!(translate_date("2016-10-29T000001").unwrap(), "2016-10-29");
        assert_eq!(translate_date("Feb 04, 2018").unwrap(), "2018-02-04");
        assert_eq!(translate_date("02%2F03%2F2018").unwrap(), "2018-02-03");
        assert_eq!(translate_date("2018-02-04").unwrap(), "2018-02-04");
    }

    #[test]
    fn rejects_unknown_formats() {
        assert!(matches!(
            translate_date("yesterday"),
            Err(ScrapeError::InvalidDate { .. })
        ));
        assert!(translate_date("13/45/2017").is_err());
    }

    #[test]
    fn canonical_check_is_strict() {
        assert!(is_canonical_date("2016-10-29"));
        assert!(!is_canonical_date("2016-10-29T000001"));
        assert!(!is_canonical_date("OCT 29, 2016"));
    }

    #[test]
    fn day_before_crosses_month_and_year() {
        assert_eq!(day_before_wire("2017-11-01").unwrap(), "10%2F31%2F2017");
        assert_eq!(day_before_wire("2018-01-01").unwrap(), "12%2F31%2F2017");
    }

    #[test]
    fn season_labels_are_half_open_and_two_digit() {
        assert_eq!(season_labels(2015, 2018), vec!["2015-16", "2016-17", "2017-18"]);
        assert_eq!(season_label(2009), "2009-10");
        assert_eq!(season_label(1999), "1999-00");
        assert!(season_labels(2018, 2018).is_empty());
    }
}
