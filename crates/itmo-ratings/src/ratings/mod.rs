//! Admission rating aggregation: scraping program pages, indexing applicants across every
//! program, and deriving per-applicant standings.

pub mod cache;
pub mod domain;
pub mod formatter;
pub mod notifier;
pub mod router;
pub mod scraper;
pub mod summary;

#[cfg(test)]
mod tests;

use std::time::Duration;

pub use cache::{CacheConfig, CacheStatus, RatingCache, RatingIndex, RefreshReport};
pub use domain::{Entry, IndexRow, ProgramDirection, ProgramSnapshot};
pub use formatter::{render_summary, FormatError};
pub use notifier::{notify_student, Notifier, NotifyError, TelegramNotifier};
pub use router::rating_router;
pub use scraper::{HttpRatingSource, ProgramPage, RatingSource, RetryPolicy, ScraperConfig};
pub use summary::{build_summary, StudentSummary, SummaryRow};

/// Failure taxonomy shared by the scraper, the cache, and the query layer.
#[derive(Debug, thiserror::Error)]
pub enum RatingsError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("program page data could not be extracted: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("operation cancelled")]
    Cancelled,
    #[error("rating data unavailable: {0}")]
    Unavailable(#[source] Box<RatingsError>),
    #[error("student {student_id} not found in any program")]
    NotFound { student_id: String },
}

impl RatingsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RatingsError::Upstream(_))
    }
}

/// Network or HTTP level failure against the admission portal.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("portal rejected request: {message}")]
    Rejected { message: String },
    #[error("malformed response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("deadline of {after:?} exceeded")]
    Deadline { after: Duration },
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<UpstreamError>,
    },
}

/// The page was downloaded but the embedded data block is missing or unreadable.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("__NEXT_DATA__ script block not found")]
    MarkerMissing,
    #[error("__NEXT_DATA__ payload is not valid page data: {0}")]
    Decode(#[source] serde_json::Error),
}
