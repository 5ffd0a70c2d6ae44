//! Zone Monitor - Main Entry Point

use alerting::Evaluator;
use api::{create_governor_config, create_router, init_logging, AppConfig, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use scheduler::{IncidentFeed, TickDriver};
use simulator::SyntheticGenerator;
use std::net::SocketAddr;
use std::sync::Arc;
use storage::IncidentRepository;
use tower_governor::GovernorLayer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== ZoneWatch Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    config.validate()?;

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    let repository = Arc::new(IncidentRepository::connect(&config.storage).await?);
    let generator = SyntheticGenerator::new(config.generator.clone(), config.seed)?;
    let evaluator = Evaluator::new(config.threshold_set(), config.severity_bands);

    let (driver, handle) = TickDriver::new(
        config.zones.clone(),
        generator,
        evaluator,
        repository.clone(),
        config.driver.clone(),
    );
    let feed = IncidentFeed::new(handle.snapshot_rx(), repository.clone());
    let driver_task = tokio::spawn(driver.run());

    let state = Arc::new(AppState::new(feed, repository, metrics_handle));
    let governor = create_governor_config(&config.rate_limit);
    let app = create_router(state).layer(GovernorLayer { config: governor });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("listening on {}", config.listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Let the in-flight tick finish before exiting
    handle.shutdown();
    driver_task.await?;
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
