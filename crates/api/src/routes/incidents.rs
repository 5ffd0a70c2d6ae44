//! Incident Feed Routes

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{IncidentLogEntry, IncidentRecord};
use tracing::warn;

use crate::AppState;

/// Query parameters for the incident feed
#[derive(Debug, Deserialize)]
pub struct IncidentQuery {
    /// Return log entries strictly after this timestamp (ms)
    pub since: Option<i64>,
    /// Maximum number of entries
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for the incident feed endpoint
#[derive(Debug, Serialize)]
pub struct IncidentFeedResponse {
    pub data: Vec<IncidentLogEntry>,
    pub count: usize,
}

/// Response for the open incidents endpoint
#[derive(Debug, Serialize)]
pub struct OpenIncidentsResponse {
    pub data: Vec<IncidentRecord>,
    pub count: usize,
}

/// Get incident log entries, newest first
pub async fn get_incidents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IncidentQuery>,
) -> Json<IncidentFeedResponse> {
    let limit = params.limit.min(500);

    let mut data = match params.since {
        Some(since) => state.feed.recent_incidents(since).await,
        None => state.repository.list_recent(limit).await,
    }
    .unwrap_or_else(|e| {
        warn!(error = %e, "failed to load incident feed");
        Vec::new()
    });
    data.truncate(limit);

    Json(IncidentFeedResponse {
        count: data.len(),
        data,
    })
}

/// Get currently open incidents
pub async fn get_open(State(state): State<Arc<AppState>>) -> Json<OpenIncidentsResponse> {
    let data = state.feed.open_incidents().await.unwrap_or_else(|e| {
        warn!(error = %e, "failed to load open incidents");
        Vec::new()
    });

    Json(OpenIncidentsResponse {
        count: data.len(),
        data,
    })
}
