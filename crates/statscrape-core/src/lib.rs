//! Core domain model for statscrape: placeholders, templates, concrete
//! requests, job specifications and normalized API responses.

mod dates;
mod error;
mod job;
mod params;
mod placeholder;
mod request;
mod response;
mod template;

pub use dates::{
    day_before_wire, is_canonical_date, parse_canonical_date, season_label, season_labels,
    to_wire_date, translate_date, CANONICAL_DATE_FORMAT, WIRE_DATE_FORMAT,
};
pub use error::ScrapeError;
pub use job::{CurrentSeasonPolicy, DuplicatePolicy, JobSpec};
pub use params::{ParamValue, Substitution};
pub use placeholder::Placeholder;
pub use request::{request_identity, ConcreteRequest, DATE_FROM_PARAM};
pub use response::{NormalizedResponse, GAME_DATE_COLUMN};
pub use template::{Template, Token};

pub const CRATE_NAME: &str = "statscrape-core";
