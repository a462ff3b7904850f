use std::future::Future;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::extract::{extract_entries, parse_catalog};
use super::retry::run_with_retries;
use super::{program_url, ProgramPage, RatingSource, ScraperConfig};
use crate::ratings::domain::ProgramDirection;
use crate::ratings::{RatingsError, UpstreamError};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

/// Portal client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpRatingSource {
    client: reqwest::Client,
    config: ScraperConfig,
}

impl HttpRatingSource {
    pub fn new(config: ScraperConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: ScraperConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Applies the per-call deadline and the caller's cancellation to `work`.
    async fn bounded<T, Fut>(&self, cancel: &CancellationToken, work: Fut) -> Result<T, RatingsError>
    where
        Fut: Future<Output = Result<T, RatingsError>>,
    {
        let deadline = self.config.deadline;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RatingsError::Cancelled),
            outcome = tokio::time::timeout(deadline, work) => outcome
                .unwrap_or_else(|_| Err(UpstreamError::Deadline { after: deadline }.into())),
        }
    }

    async fn get_page(&self, url: &str) -> Result<String, UpstreamError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    async fn get_catalog(&self) -> Result<Vec<ProgramDirection>, UpstreamError> {
        let url = &self.config.catalog_url;
        let response = self
            .client
            .get(url)
            .headers(catalog_headers())
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                url: url.clone(),
            });
        }

        let body = response.bytes().await?;
        parse_catalog(&body)
    }
}

#[async_trait]
impl RatingSource for HttpRatingSource {
    async fn fetch_catalog(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProgramDirection>, RatingsError> {
        let programs = self
            .bounded(cancel, async {
                self.get_catalog().await.map_err(RatingsError::from)
            })
            .await?;
        debug!(programs = programs.len(), "catalog fetched");
        Ok(programs)
    }

    async fn fetch_entries(
        &self,
        cancel: &CancellationToken,
        program_id: i64,
    ) -> Result<ProgramPage, RatingsError> {
        let url = program_url(&self.config.program_page_template, program_id);
        let fetched_at = Utc::now().fixed_offset();

        let html = self
            .bounded(
                cancel,
                run_with_retries(self.config.retry, cancel, |_| self.get_page(&url)),
            )
            .await?;

        let page = extract_entries(&html).map_err(|err| {
            error!(program_id, url = %url, error = %err, "program page no longer carries readable rating data");
            err
        })?;

        Ok(ProgramPage {
            entries: page.entries,
            updated_at: page.updated_at.unwrap_or(fetched_at),
        })
    }
}

/// Header set the catalog API expects from a browser session; bare clients get blocked.
fn catalog_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("ru"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(header::ORIGIN, HeaderValue::from_static("https://abit.itmo.ru"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("priority"),
        HeaderValue::from_static("u=1, i"),
    );
    headers.insert(header::REFERER, HeaderValue::from_static("https://abit.itmo.ru/"));
    headers.insert(
        HeaderName::from_static("sec-ch-ua"),
        HeaderValue::from_static(r#""Not)A;Brand";v="8", "Chromium";v="138""#),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-mobile"),
        HeaderValue::from_static("?0"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-platform"),
        HeaderValue::from_static(r#""macOS""#),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("empty"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("cors"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("same-site"),
    );
    headers.insert(header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratings::scraper::fixtures::{next_data, program_page, raw_entry};
    use crate::ratings::scraper::RetryPolicy;
    use crate::ratings::ExtractionError;
    use std::time::Duration;

    fn source_for(server: &mockito::ServerGuard) -> HttpRatingSource {
        HttpRatingSource::new(ScraperConfig {
            catalog_url: format!("{}/api/v1/rating/directions?degree=master", server.url()),
            program_page_template: format!("{}/rating/master/budget/{{id}}", server.url()),
            retry: RetryPolicy::new(3, Duration::from_millis(5)),
            deadline: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        })
        .expect("client builds")
    }

    #[test]
    fn program_url_substitutes_identifier() {
        assert_eq!(
            program_url(super::super::PROGRAM_PAGE_URL_TEMPLATE, 1651),
            "https://abit.itmo.ru/rating/master/budget/1651"
        );
    }

    #[tokio::test]
    async fn catalog_request_carries_browser_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/rating/directions")
            .match_query(mockito::Matcher::UrlEncoded(
                "degree".into(),
                "master".into(),
            ))
            .match_header("origin", "https://abit.itmo.ru")
            .match_header("accept", "application/json")
            .match_header("user-agent", BROWSER_USER_AGENT)
            .with_status(200)
            .with_body(r#"{"ok":true,"message":"","result":{"items":[{"direction_title":"Robotics","budget_min":12,"contract":4,"target_reception":1,"isu_id":null,"invalid":1,"special_quota":1,"competitive_group_id":77}]}}"#)
            .create_async()
            .await;

        let programs = source_for(&server)
            .fetch_catalog(&CancellationToken::new())
            .await
            .expect("catalog fetched");

        mock.assert_async().await;
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].title, "Robotics");
        assert_eq!(programs[0].budget_seats, 12);
    }

    #[tokio::test]
    async fn catalog_http_error_is_upstream_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/rating/directions")
            .match_query(mockito::Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let error = source_for(&server)
            .fetch_catalog(&CancellationToken::new())
            .await
            .expect_err("403 fails");

        assert!(matches!(
            error,
            RatingsError::Upstream(UpstreamError::Status { status: 403, .. })
        ));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn entries_are_fetched_and_flattened() {
        let mut server = mockito::Server::new_async().await;
        let entries = [raw_entry("4410001", 1, 1), raw_entry("4410002", 2, 3)].join(",");
        let body = program_page(&next_data(&entries, "\"2025-08-01T10:15:00+03:00\""));
        let _mock = server
            .mock("GET", "/rating/master/budget/1651")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body(body)
            .create_async()
            .await;

        let page = source_for(&server)
            .fetch_entries(&CancellationToken::new(), 1651)
            .await
            .expect("page fetched");

        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[1].student_id, "4410002");
        assert_eq!(page.updated_at.to_rfc3339(), "2025-08-01T10:15:00+03:00");
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rating/master/budget/9")
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let error = source_for(&server)
            .fetch_entries(&CancellationToken::new(), 9)
            .await
            .expect_err("all attempts fail");

        mock.assert_async().await;
        assert!(matches!(
            error,
            RatingsError::Upstream(UpstreamError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn page_without_marker_is_an_extraction_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rating/master/budget/5")
            .with_status(200)
            .with_body("<html><body>maintenance</body></html>")
            .expect(1)
            .create_async()
            .await;

        let error = source_for(&server)
            .fetch_entries(&CancellationToken::new(), 5)
            .await
            .expect_err("no data block");

        mock.assert_async().await;
        assert!(matches!(
            error,
            RatingsError::Extraction(ExtractionError::MarkerMissing)
        ));
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn cancelled_fetch_does_not_touch_the_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rating/master/budget/5")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = source_for(&server)
            .fetch_entries(&cancel, 5)
            .await
            .expect_err("cancelled");

        mock.assert_async().await;
        assert!(matches!(error, RatingsError::Cancelled));
    }

    #[tokio::test]
    async fn deadline_cuts_retries_short() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener binds");
        let addr = listener.local_addr().expect("local addr");
        // Accept and hold connections without ever answering.
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let deadline = Duration::from_millis(300);
        let source = HttpRatingSource::new(ScraperConfig {
            catalog_url: format!("http://{addr}/catalog"),
            program_page_template: format!("http://{addr}/rating/master/budget/{{id}}"),
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
            deadline,
            request_timeout: Duration::from_secs(5),
        })
        .expect("client builds");

        let started = std::time::Instant::now();
        let error = source
            .fetch_entries(&CancellationToken::new(), 1651)
            .await
            .expect_err("deadline fires");
        let elapsed = started.elapsed();

        match error {
            RatingsError::Upstream(UpstreamError::Deadline { after }) => assert_eq!(after, deadline),
            other => panic!("expected deadline error, got {other:?}"),
        }
        assert!(elapsed >= deadline);
        assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
    }
}
