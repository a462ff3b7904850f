use axum::Router;
use itmo_ratings::config::{ConfigError, RateLimitConfig};
use itmo_ratings::error::AppError;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::GlobalKeyExtractor;
use tower_governor::GovernorLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Wraps the whole router in a process-wide token bucket and per-request logging.
///
/// Requests beyond the bucket get `429 Too Many Requests`.
pub(crate) fn with_request_middleware(
    router: Router,
    limits: &RateLimitConfig,
) -> Result<Router, AppError> {
    let refill_ms = (1_000 / u64::from(limits.per_second.max(1))).max(1);
    let governor = GovernorConfigBuilder::default()
        .key_extractor(GlobalKeyExtractor)
        .per_millisecond(refill_ms)
        .burst_size(limits.burst)
        .finish()
        .ok_or(ConfigError::InvalidNumber {
            var: "APP_RATE_LIMIT_BURST",
        })?;

    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Ok(router
        .layer(GovernorLayer {
            config: Arc::new(governor),
        })
        .layer(trace))
}
