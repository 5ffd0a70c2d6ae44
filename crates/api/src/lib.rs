//! Zone Monitoring API Server
//!
//! REST polling endpoints for the environmental monitoring dashboard.

use axum::{extract::State, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use scheduler::IncidentFeed;
use serde::Serialize;
use std::sync::Arc;
use storage::IncidentRepository;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod rate_limit;
mod routes;

pub use crate::config::{AppConfig, ZoneThreshold};
pub use rate_limit::{create_governor_config, DefaultGovernorConfig, RateLimitConfig};

/// Application state shared across handlers
pub struct AppState {
    /// Read-only view over the driver's output
    pub feed: IncidentFeed,
    /// Incident store, for feed queries and health counters
    pub repository: Arc<IncidentRepository>,
    /// Prometheus render handle
    pub metrics: PrometheusHandle,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(
        feed: IncidentFeed,
        repository: Arc<IncidentRepository>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            feed,
            repository,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
    pub metrics: SystemMetrics,
}

/// Component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub driver: ComponentHealth,
    pub storage: ComponentHealth,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub last_activity_ms: Option<i64>,
}

/// System metrics
#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub last_tick: u64,
    pub open_incidents: usize,
    pub incident_count: u64,
    pub log_entries: u64,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/snapshot", get(routes::snapshot::get_snapshot))
        .route("/api/v1/incidents", get(routes::incidents::get_incidents))
        .route("/api/v1/incidents/open", get(routes::incidents::get_open))
        .route("/api/v1/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let snapshot = state.feed.current_snapshot();
    let open_incidents = state
        .feed
        .open_incidents()
        .await
        .map(|v| v.len())
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to count open incidents for health");
            0
        });
    let incident_count = state.repository.incident_count().await.unwrap_or(0);
    let log_entries = state.repository.log_count().await.unwrap_or(0);

    let driver_status = if snapshot.tick > 0 { "ok" } else { "starting" };

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus {
            driver: ComponentHealth {
                status: driver_status.to_string(),
                last_activity_ms: Some(snapshot.timestamp_ms),
            },
            storage: ComponentHealth {
                status: "ok".to_string(),
                last_activity_ms: None,
            },
        },
        metrics: SystemMetrics {
            last_tick: snapshot.tick,
            open_incidents,
            incident_count,
            log_entries,
        },
    })
}

/// Prometheus metrics render
async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}

/// Initialize logging
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state_with_snapshot;

    #[tokio::test]
    async fn test_health_reports_starting_before_first_tick() {
        let (state, _tx) = state_with_snapshot().await;
        let response = health_handler(State(state)).await;

        assert_eq!(response.0.status, "healthy");
        assert_eq!(response.0.components.driver.status, "starting");
        assert_eq!(response.0.metrics.last_tick, 0);
        assert_eq!(response.0.metrics.open_incidents, 0);
    }
}
