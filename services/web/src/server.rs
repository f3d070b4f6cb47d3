use crate::cli::ServeArgs;
use crate::infra::build_state;
use crate::routes::app_router;
use axum_prometheus::PrometheusMetricLayer;
use listing_review::config::AppConfig;
use listing_review::error::AppError;
use listing_review::telemetry;
use std::sync::atomic::Ordering;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let state = build_state(&config, prometheus_handle).await?;
    let readiness_flag = state.readiness.clone();

    let app = app_router(state).layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        data_dir = %config.storage.data_dir.display(),
        "listing review service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
