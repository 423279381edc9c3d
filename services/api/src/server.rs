use crate::cli::ServeArgs;
use crate::infra::{saturating_millis, session_settings, spawn_session_driver, AppState};
use crate::routes::with_session_routes;
use applyflow::config::AppConfig;
use applyflow::error::AppError;
use applyflow::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let driver = spawn_session_driver(session_settings(&config.workflow));
    let process_id = driver.snapshot().await.process_id;

    let app = with_session_routes(driver)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        process_id = %process_id.0,
        stage_step_ms = saturating_millis(config.workflow.stage_timings.profile_review()),
        "application workflow simulator ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
