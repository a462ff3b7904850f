mod client;
mod extract;
pub(crate) mod models;
mod retry;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tokio_util::sync::CancellationToken;

use super::domain::{Entry, ProgramDirection};
use super::RatingsError;

pub use client::HttpRatingSource;
pub use extract::{extract_entries, parse_catalog, ExtractedPage};
pub use retry::RetryPolicy;

#[cfg(test)]
pub(crate) use extract::fixtures;

pub const CATALOG_URL: &str = "https://abitlk.itmo.ru/api/v1/rating/directions?degree=master";
pub const PROGRAM_PAGE_URL_TEMPLATE: &str = "https://abit.itmo.ru/rating/master/budget/{id}";

/// Substitutes a competitive-group id into a `{id}` URL template.
pub fn program_url(template: &str, program_id: i64) -> String {
    template.replace("{id}", &program_id.to_string())
}

/// One program's ranking list as fetched from the portal.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramPage {
    pub entries: Vec<Entry>,
    pub updated_at: DateTime<FixedOffset>,
}

/// Where ratings come from. The cache only talks to the portal through this trait.
#[async_trait]
pub trait RatingSource: Send + Sync {
    async fn fetch_catalog(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProgramDirection>, RatingsError>;

    async fn fetch_entries(
        &self,
        cancel: &CancellationToken,
        program_id: i64,
    ) -> Result<ProgramPage, RatingsError>;
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub catalog_url: String,
    pub program_page_template: String,
    pub retry: RetryPolicy,
    /// Upper bound for one fetch call including every retry.
    pub deadline: Duration,
    pub request_timeout: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            catalog_url: CATALOG_URL.to_string(),
            program_page_template: PROGRAM_PAGE_URL_TEMPLATE.to_string(),
            retry: RetryPolicy::default(),
            deadline: Duration::from_secs(5 * 60),
            request_timeout: Duration::from_secs(60),
        }
    }
}
