use itmo_ratings::config::AppConfig;
use itmo_ratings::error::AppError;
use itmo_ratings::ratings::{HttpRatingSource, RatingCache, RatingsError};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) commit_id: Arc<str>,
}

pub(crate) type PortalCache = RatingCache<HttpRatingSource>;

/// Rating cache wired to the live admission portal.
pub(crate) fn build_cache(config: &AppConfig) -> Result<Arc<PortalCache>, AppError> {
    let source = HttpRatingSource::new(config.ratings.scraper()).map_err(RatingsError::from)?;
    Ok(Arc::new(RatingCache::new(source, config.ratings.cache())))
}

/// Resolves once Ctrl-C arrives or `token` is cancelled elsewhere.
pub(crate) async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(error = %err, "failed to listen for ctrl-c");
                token.cancelled().await;
                return;
            }
            info!("shutdown requested");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

pub(crate) fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(shutdown_signal(token));
}
