use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api_coverage_gate::bus::memory::{
    spawn_consumer, DeliveryPolicy, InMemoryBus, CALCULATION_REQUESTS_TOPIC,
    COVERAGE_RESPONSES_TOPIC,
};
use api_coverage_gate::bus::{CalculationRequest, CoverageResponse, MessageBus, MessageHandler};
use api_coverage_gate::calculation::CalculationWorker;
use api_coverage_gate::collaborators::catalog::HttpApiDocumentSource;
use api_coverage_gate::collaborators::config_source::{
    load_quality_gates_file, HttpQualityGateConfigSource,
};
use api_coverage_gate::collaborators::tracing_store::HttpTracingStore;
use api_coverage_gate::collaborators::QualityGateConfigSource;
use api_coverage_gate::config::{
    CliArgs, QualityGateSource, ServiceConfig, REDELIVERY_BACKOFF_MS,
    STALE_REPORT_CHECK_INTERVAL_SECS,
};
use api_coverage_gate::coverage::coordinator::CoverageCoordinator;
use api_coverage_gate::coverage::registry::CalculatorRegistry;
use api_coverage_gate::report::db::ReportDb;
use api_coverage_gate::report::dispatch::DispatchOrchestrator;
use api_coverage_gate::report::listener::ResultListener;
use api_coverage_gate::report::monitor::spawn_stale_report_monitor;
use api_coverage_gate::server;
use api_coverage_gate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let _log_guard = init_tracing(args.log_dir.as_deref());

    info!("Starting api-coverage-gate v{}", env!("CARGO_PKG_VERSION"));
    let config = ServiceConfig::from_args(args)?;
    info!("Data dir: {:?}", config.data_dir);
    info!("Catalog: {}", config.catalog_url);
    info!(
        "Tracing store: {} (bucket '{}')",
        config.tracing_store_url, config.tracing_bucket
    );
    info!("Result merge policy: {:?}", config.result_merge);

    // Fails fast when a criterion has no calculator or two.
    let registry = Arc::new(CalculatorRegistry::standard()?);
    info!("Registered {} coverage calculators", registry.len());

    let db = Arc::new(ReportDb::new(&config.data_dir)?);
    info!("Report db at {:?}", db.db_path());

    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()?;
    let timeout = config.upstream_timeout();

    let configs: Arc<dyn QualityGateConfigSource> = match &config.quality_gates {
        QualityGateSource::Service(url) => {
            info!("Quality gates from config service {}", url);
            Arc::new(HttpQualityGateConfigSource::new(
                http_client.clone(),
                url.clone(),
                timeout,
            ))
        }
        QualityGateSource::File(path) => Arc::new(load_quality_gates_file(path)?),
    };
    let documents = Arc::new(HttpApiDocumentSource::new(
        http_client.clone(),
        config.catalog_url.clone(),
        timeout,
    ));
    let tracing_store = Arc::new(HttpTracingStore::new(
        http_client,
        config.tracing_store_url.clone(),
        config.tracing_bucket.clone(),
        timeout,
    ));

    // Bus and its two consumers
    let (bus, receivers) = InMemoryBus::new();
    let policy = DeliveryPolicy {
        max_attempts: config.max_delivery_attempts,
        backoff: Duration::from_millis(REDELIVERY_BACKOFF_MS),
    };
    let publisher: Arc<dyn MessageBus> = Arc::new(bus.clone());

    let worker: Arc<dyn MessageHandler<CalculationRequest>> = Arc::new(CalculationWorker::new(
        documents,
        tracing_store,
        CoverageCoordinator::new(registry),
        publisher.clone(),
    ));
    let listener: Arc<dyn MessageHandler<CoverageResponse>> = Arc::new(ResultListener::new(
        db.clone(),
        configs.clone(),
        config.result_merge,
    ));
    let _requests_consumer = spawn_consumer(
        CALCULATION_REQUESTS_TOPIC,
        receivers.requests,
        bus.request_sender(),
        policy,
        worker,
    );
    let _responses_consumer = spawn_consumer(
        COVERAGE_RESPONSES_TOPIC,
        receivers.responses,
        bus.response_sender(),
        policy,
        listener,
    );

    let _monitor_handle = spawn_stale_report_monitor(
        db.clone(),
        config.stale_report_after,
        Duration::from_secs(STALE_REPORT_CHECK_INTERVAL_SECS),
    );

    let dispatcher = DispatchOrchestrator::new(db.clone(), configs, publisher);
    let state = Arc::new(AppState::new(
        db,
        dispatcher,
        config.default_lookback_secs,
        config.stale_report_after,
    ));

    let router = server::build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Listening on http://0.0.0.0:{}", config.port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("api-coverage-gate shutting down");
    Ok(())
}

/// Stdout always; a daily-rolling file as well when `log_dir` is set. The
/// returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "api_coverage_gate=info,tower_http=info".into());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "api-coverage-gate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
