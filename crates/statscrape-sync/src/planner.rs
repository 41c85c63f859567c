use chrono::{Days, NaiveDate};
use serde::Serialize;
use statscrape_core::{ConcreteRequest, CurrentSeasonPolicy};
use statscrape_storage::{ScrapeLog, StoreError};
use tracing::warn;

/// Days of overlap kept when narrowing a current-season request, so games
/// finalized after the previous scrape are picked up again.
pub const NARROW_OVERLAP_DAYS: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScrapeState {
    NeverScraped,
    ScrapedCurrentSeason,
    ScrapedPastSeason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDecision {
    Issue(ConcreteRequest),
    Reissue(ConcreteRequest),
    Narrowed {
        request: ConcreteRequest,
        since: NaiveDate,
    },
    Skip {
        identity: String,
    },
}

impl PlanDecision {
    /// The request to send, if any.
    pub fn request(&self) -> Option<&ConcreteRequest> {
        match self {
            PlanDecision::Issue(request)
            | PlanDecision::Reissue(request)
            | PlanDecision::Narrowed { request, .. } => Some(request),
            PlanDecision::Skip { .. } => None,
        }
    }

    pub fn into_request(self) -> Option<ConcreteRequest> {
        match self {
            PlanDecision::Issue(request)
            | PlanDecision::Reissue(request)
            | PlanDecision::Narrowed { request, .. } => Some(request),
            PlanDecision::Skip { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlanDecision::Issue(_) => "issue",
            PlanDecision::Reissue(_) => "reissue",
            PlanDecision::Narrowed { .. } => "narrow",
            PlanDecision::Skip { .. } => "skip",
        }
    }
}

/// Decides, per request, whether and how to issue it given the scrape log.
#[derive(Debug, Clone)]
pub struct IncrementalPlanner {
    log: ScrapeLog,
    current_season: String,
}

impl IncrementalPlanner {
    pub fn new(log: ScrapeLog, current_season: impl Into<String>) -> Self {
        Self {
            log,
            current_season: current_season.into(),
        }
    }

    pub fn log(&self) -> &ScrapeLog {
        &self.log
    }

    pub async fn state(&self, request: &ConcreteRequest) -> Result<ScrapeState, StoreError> {
        if !self.log.already_scraped(&request.identity()).await? {
            return Ok(ScrapeState::NeverScraped);
        }
        // A request with no season behaves like a finished one.
        Ok(match request.season() {
            Some(season) if season == self.current_season => ScrapeState::ScrapedCurrentSeason,
            _ => ScrapeState::ScrapedPastSeason,
        })
    }

    pub async fn plan(
        &self,
        request: ConcreteRequest,
        policy: CurrentSeasonPolicy,
    ) -> Result<PlanDecision, StoreError> {
        match self.state(&request).await? {
            ScrapeState::NeverScraped => Ok(PlanDecision::Issue(request)),
            ScrapeState::ScrapedPastSeason => Ok(PlanDecision::Skip {
                identity: request.identity(),
            }),
            ScrapeState::ScrapedCurrentSeason => match policy {
                CurrentSeasonPolicy::Reissue => Ok(PlanDecision::Reissue(request)),
                CurrentSeasonPolicy::Narrow => self.narrow(request).await,
            },
        }
    }

    async fn narrow(&self, request: ConcreteRequest) -> Result<PlanDecision, StoreError> {
        let Some(last) = self.log.last_scraped(&request.identity()).await? else {
            return Ok(PlanDecision::Issue(request));
        };
        let since = last
            .date_naive()
            .checked_sub_days(Days::new(NARROW_OVERLAP_DAYS))
            .unwrap_or(NaiveDate::MIN);
        match request.with_date_from(since) {
            Some(narrowed) => Ok(PlanDecision::Narrowed {
                request: narrowed,
                since,
            }),
            None => {
                warn!(url = %request.url, "no DateFrom parameter to narrow; reissuing unchanged");
                Ok(PlanDecision::Reissue(request))
            }
        }
    }
}
