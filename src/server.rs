use crate::cli::ServeArgs;
use crate::infra::{build_runtime, spawn_result_sweeper, AppState};
use crate::routes::with_proofing_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use idv_proofing::config::AppConfig;
use idv_proofing::error::AppError;
use idv_proofing::proofing::VendorSet;
use idv_proofing::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const RESULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(concurrency) = args.concurrency.take() {
        config.worker.concurrency = concurrency;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let app_state = AppState::new(prometheus_handle);
    let readiness_flag = Arc::clone(&app_state.readiness);

    let runtime = build_runtime(
        &config.proofing,
        &config.worker,
        config.encryption.encryptor(),
        VendorSet::mock(),
    );
    let sweeper = spawn_result_sweeper(Arc::clone(&runtime.service), RESULT_SWEEP_INTERVAL);

    let app = with_proofing_routes(Arc::clone(&runtime.service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        workers = config.worker.concurrency,
        queue_capacity = config.worker.queue_capacity,
        "identity proofing orchestrator ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&readiness_flag)))
        .await?;

    info!("draining proofing queue");
    sweeper.abort();
    runtime.queue.shutdown().await;
    info!("proofing workers stopped");
    Ok(())
}

async fn shutdown_signal(readiness: Arc<AtomicBool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    readiness.store(false, Ordering::Release);
    info!("shutdown signal received");
}
