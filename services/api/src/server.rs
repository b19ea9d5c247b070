use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryNurseRepository, InMemoryRequestRepository, InMemoryReviewRepository,
    LoggingNotificationPublisher,
};
use crate::routes::with_engine_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use care_match::config::AppConfig;
use care_match::error::AppError;
use care_match::matching::MatchingService;
use care_match::telemetry;
use tracing::info;

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
    };

    let requests = Arc::new(InMemoryRequestRepository::default());
    let nurses = Arc::new(InMemoryNurseRepository::default());
    let reviews = Arc::new(InMemoryReviewRepository::default());
    let notifier = Arc::new(LoggingNotificationPublisher);
    let matching_service = Arc::new(
        MatchingService::new(requests, nurses, reviews, notifier, config.matching.clone())
            .map_err(care_match::matching::MatchingServiceError::from)?,
    );

    let app = with_engine_routes(matching_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "nurse matching service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
