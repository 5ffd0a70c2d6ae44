//! Snapshot Route
//!
//! The main polling endpoint: every configured zone with its latest reading
//! per metric, plus the currently open incidents. Always reflects the most
//! recent completed tick.

use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use storage::IncidentStatus;
use telemetry::{Metric, Severity};
use tracing::warn;

use crate::AppState;

/// One zone with its latest readings
#[derive(Debug, Serialize)]
pub struct ZoneEntry {
    pub id: u32,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub readings: BTreeMap<Metric, f64>,
}

/// One open incident
#[derive(Debug, Serialize)]
pub struct IncidentEntry {
    pub id: i64,
    pub zone: u32,
    pub metric: Metric,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub timestamp: i64,
}

/// Response for the snapshot endpoint
#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub tick: u64,
    pub timestamp_ms: i64,
    pub zones: Vec<ZoneEntry>,
    pub incidents: Vec<IncidentEntry>,
}

/// Get the current zone snapshot with open incidents
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> Json<SnapshotResponse> {
    metrics::counter!("zonewatch_snapshot_requests_total").increment(1);

    let snapshot = state.feed.current_snapshot();
    let incidents = state.feed.open_incidents().await.unwrap_or_else(|e| {
        warn!(error = %e, "failed to load open incidents for snapshot");
        Vec::new()
    });

    Json(SnapshotResponse {
        tick: snapshot.tick,
        timestamp_ms: snapshot.timestamp_ms,
        zones: snapshot
            .zones
            .iter()
            .map(|z| ZoneEntry {
                id: z.zone.id,
                name: z.zone.name.clone(),
                lat: z.zone.lat,
                lon: z.zone.lon,
                readings: z.readings.clone(),
            })
            .collect(),
        incidents: incidents
            .into_iter()
            .map(|i| IncidentEntry {
                id: i.id,
                zone: i.zone_id,
                metric: i.metric,
                severity: i.severity,
                status: i.status,
                timestamp: i.opened_at,
            })
            .collect(),
    })
}
