use crate::cli::ServeArgs;
use crate::infra::{build_cache, shutdown_signal, AppState};
use crate::middleware::with_request_middleware;
use crate::routes::with_rating_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use itmo_ratings::config::AppConfig;
use itmo_ratings::error::AppError;
use itmo_ratings::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        commit_id: Arc::from(config.build.commit_id.as_str()),
    };

    let cache = build_cache(&config)?;
    let refresh_loop = cache
        .clone()
        .spawn_refresh_loop(config.ratings.refresh_interval);

    let app = with_rating_routes(cache.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);
    let app = with_request_middleware(app, &config.server.rate_limit)?;

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        refresh_secs = config.ratings.refresh_interval.as_secs(),
        "rating service ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cache.shutdown_token().clone()))
        .await?;

    readiness_flag.store(false, Ordering::Release);
    cache.shutdown();
    if let Err(err) = refresh_loop.await {
        warn!(error = %err, "refresh loop ended abnormally");
    }

    info!("rating service stopped");
    Ok(())
}
