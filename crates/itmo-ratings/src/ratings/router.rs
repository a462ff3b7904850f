use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Json, Router,
};
use tracing::warn;

use super::cache::RatingCache;
use super::formatter::render_summary;
use super::scraper::RatingSource;
use super::summary::StudentSummary;

/// Router builder exposing applicant summaries.
///
/// Failures surface as bare status codes: 400 for a malformed id or method, 500 for anything
/// the cache or formatter reports.
pub fn rating_router<S>(cache: Arc<RatingCache<S>>) -> Router
where
    S: RatingSource + 'static,
{
    Router::new()
        .route(
            "/api/v1/rating/summary/:id",
            get_only(get(summary_handler::<S>)),
        )
        .route(
            "/api/v1/rating/summary/:id/raw",
            get_only(get(raw_summary_handler::<S>)),
        )
        .with_state(cache)
}

fn get_only<S>(route: MethodRouter<S>) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.fallback(|| async { StatusCode::BAD_REQUEST })
}

pub(crate) async fn summary_handler<S>(
    State(cache): State<Arc<RatingCache<S>>>,
    Path(id): Path<String>,
) -> Response
where
    S: RatingSource + 'static,
{
    let summary = match load_summary(&cache, &id).await {
        Ok(summary) => summary,
        Err(status) => return status.into_response(),
    };

    match render_summary(&summary) {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(error) => {
            warn!(student_id = %id, error = %error, "rating summary could not be rendered");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub(crate) async fn raw_summary_handler<S>(
    State(cache): State<Arc<RatingCache<S>>>,
    Path(id): Path<String>,
) -> Response
where
    S: RatingSource + 'static,
{
    match load_summary(&cache, &id).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(status) => status.into_response(),
    }
}

async fn load_summary<S>(cache: &RatingCache<S>, id: &str) -> Result<StudentSummary, StatusCode>
where
    S: RatingSource,
{
    if id.parse::<i64>().is_err() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let cancel = cache.shutdown_token().child_token();
    cache.summary(&cancel, id).await.map_err(|error| {
        warn!(student_id = %id, error = %error, "rating summary request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
