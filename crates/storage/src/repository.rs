//! Repository Implementation

use crate::StorageError;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use telemetry::{Metric, Severity};
use tracing::{debug, info, warn};

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database URL
    pub url: String,
    /// Bounded timeout applied to every write (ms)
    pub write_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://zonewatch.db".to_string(),
            write_timeout_ms: 2_000,
        }
    }
}

/// Incident lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

impl IncidentStatus {
    /// Stable identifier used in JSON and SQL
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Resolved => "resolved",
        }
    }

    /// Parse the stable identifier
    pub fn parse(s: &str) -> Option<IncidentStatus> {
        match s {
            "open" => Some(IncidentStatus::Open),
            "resolved" => Some(IncidentStatus::Resolved),
            _ => None,
        }
    }
}

/// Input to [`IncidentRepository::record_open`]: the triggering reading plus
/// its computed severity
#[derive(Debug, Clone)]
pub struct OpenIncident {
    pub zone_id: u32,
    pub metric: Metric,
    pub value: f64,
    pub severity: Severity,
    pub timestamp_ms: i64,
}

/// Current state of one incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: i64,
    pub zone_id: u32,
    pub metric: Metric,
    pub value: f64,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub opened_at: i64,
    pub resolved_at: Option<i64>,
}

/// One append-only audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentLogEntry {
    pub id: i64,
    pub incident_id: i64,
    pub zone_id: u32,
    pub metric: Metric,
    pub value: f64,
    pub severity: Severity,
    pub transition: IncidentStatus,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy)]
struct CachedOpen {
    id: i64,
    severity: Severity,
}

/// Repository for incident persistence.
///
/// The tick driver is the only writer; reads may come from any task. The
/// open-incident cache mirrors the `incidents` table rows with status `open`
/// and is rebuilt from the database at connect.
pub struct IncidentRepository {
    pool: SqlitePool,
    write_timeout_ms: u64,
    open_cache: Mutex<HashMap<(u32, Metric), CachedOpen>>,
}

impl IncidentRepository {
    /// Open the database, create the schema and rebuild the open-incident
    /// cache for crash recovery.
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        info!("opening incident store at {}", config.url);

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS incidents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                zone_id INTEGER NOT NULL,
                metric TEXT NOT NULL,
                value REAL NOT NULL,
                severity TEXT NOT NULL,
                status TEXT NOT NULL,
                opened_at INTEGER NOT NULL,
                resolved_at INTEGER
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS incident_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id INTEGER NOT NULL,
                zone_id INTEGER NOT NULL,
                metric TEXT NOT NULL,
                value REAL NOT NULL,
                severity TEXT NOT NULL,
                transition TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        let repository = Self {
            pool,
            write_timeout_ms: config.write_timeout_ms,
            open_cache: Mutex::new(HashMap::new()),
        };
        repository.rebuild_cache().await?;
        Ok(repository)
    }

    async fn rebuild_cache(&self) -> Result<(), StorageError> {
        let rows = sqlx::query("SELECT id, zone_id, metric, severity FROM incidents WHERE status = 'open'")
            .fetch_all(&self.pool)
            .await?;

        let mut cache = self.lock_cache()?;
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let zone_id: i64 = row.try_get("zone_id")?;
            let metric = parse_metric(row.try_get::<String, _>("metric")?)?;
            let severity = parse_severity(row.try_get::<String, _>("severity")?)?;
            cache.insert((zone_id as u32, metric), CachedOpen { id, severity });
        }
        if !cache.is_empty() {
            warn!("recovered {} open incident(s) from a previous run", cache.len());
        }
        Ok(())
    }

    /// Record an incident opening.
    ///
    /// Idempotent per (zone, metric) while an incident is already Open: the
    /// duplicate is merged into the existing record (value and severity are
    /// escalated only when the new severity ranks higher) and the existing id
    /// is returned. Never produces a second Open row.
    pub async fn record_open(&self, incident: OpenIncident) -> Result<i64, StorageError> {
        let existing = {
            let cache = self.lock_cache()?;
            cache.get(&(incident.zone_id, incident.metric)).copied()
        };

        match existing {
            Some(open) => self.bounded(self.merge_open(open, incident)).await,
            None => self.bounded(self.insert_open(incident)).await,
        }
    }

    async fn merge_open(
        &self,
        open: CachedOpen,
        incident: OpenIncident,
    ) -> Result<i64, StorageError> {
        if incident.severity > open.severity {
            sqlx::query("UPDATE incidents SET value = ?, severity = ? WHERE id = ?")
                .bind(incident.value)
                .bind(incident.severity.as_str())
                .bind(open.id)
                .execute(&self.pool)
                .await?;

            let mut cache = self.lock_cache()?;
            cache.insert(
                (incident.zone_id, incident.metric),
                CachedOpen {
                    id: open.id,
                    severity: incident.severity,
                },
            );
            info!(
                incident_id = open.id,
                zone_id = incident.zone_id,
                metric = %incident.metric,
                severity = %incident.severity,
                "open incident escalated"
            );
        } else {
            debug!(
                incident_id = open.id,
                zone_id = incident.zone_id,
                metric = %incident.metric,
                "duplicate open merged into existing incident"
            );
        }
        Ok(open.id)
    }

    async fn insert_open(&self, incident: OpenIncident) -> Result<i64, StorageError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO incidents (zone_id, metric, value, severity, status, opened_at, resolved_at)
             VALUES (?, ?, ?, ?, 'open', ?, NULL)",
        )
        .bind(incident.zone_id as i64)
        .bind(incident.metric.as_str())
        .bind(incident.value)
        .bind(incident.severity.as_str())
        .bind(incident.timestamp_ms)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        sqlx::query(
            "INSERT INTO incident_log (incident_id, zone_id, metric, value, severity, transition, timestamp_ms)
             VALUES (?, ?, ?, ?, ?, 'open', ?)",
        )
        .bind(id)
        .bind(incident.zone_id as i64)
        .bind(incident.metric.as_str())
        .bind(incident.value)
        .bind(incident.severity.as_str())
        .bind(incident.timestamp_ms)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut cache = self.lock_cache()?;
        cache.insert(
            (incident.zone_id, incident.metric),
            CachedOpen {
                id,
                severity: incident.severity,
            },
        );
        info!(
            incident_id = id,
            zone_id = incident.zone_id,
            metric = %incident.metric,
            value = incident.value,
            severity = %incident.severity,
            "incident opened"
        );
        Ok(id)
    }

    /// Record an incident resolution.
    ///
    /// A no-op returning `Ok` for unknown or already-Resolved ids, tolerating
    /// out-of-order delivery.
    pub async fn record_resolved(&self, id: i64, timestamp_ms: i64) -> Result<(), StorageError> {
        self.bounded(self.resolve_inner(id, timestamp_ms)).await
    }

    async fn resolve_inner(&self, id: i64, timestamp_ms: i64) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT zone_id, metric, value, severity FROM incidents WHERE id = ? AND status = 'open'",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            debug!(incident_id = id, "resolve on unknown or resolved incident, no-op");
            return Ok(());
        };

        let zone_id: i64 = row.try_get("zone_id")?;
        let metric = parse_metric(row.try_get::<String, _>("metric")?)?;
        let value: f64 = row.try_get("value")?;
        let severity = parse_severity(row.try_get::<String, _>("severity")?)?;

        sqlx::query("UPDATE incidents SET status = 'resolved', resolved_at = ? WHERE id = ?")
            .bind(timestamp_ms)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO incident_log (incident_id, zone_id, metric, value, severity, transition, timestamp_ms)
             VALUES (?, ?, ?, ?, ?, 'resolved', ?)",
        )
        .bind(id)
        .bind(zone_id)
        .bind(metric.as_str())
        .bind(value)
        .bind(severity.as_str())
        .bind(timestamp_ms)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut cache = self.lock_cache()?;
        cache.remove(&(zone_id as u32, metric));
        info!(incident_id = id, zone_id, metric = %metric, "incident resolved");
        Ok(())
    }

    /// Id of the currently Open incident for a (zone, metric) pair, if any
    pub fn open_id_for(&self, zone_id: u32, metric: Metric) -> Result<Option<i64>, StorageError> {
        let cache = self.lock_cache()?;
        Ok(cache.get(&(zone_id, metric)).map(|open| open.id))
    }

    /// All currently Open incidents, most recently opened first
    pub async fn list_open(&self) -> Result<Vec<IncidentRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, zone_id, metric, value, severity, status, opened_at, resolved_at
             FROM incidents WHERE status = 'open' ORDER BY opened_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    /// The most recent log entries, timestamp descending
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<IncidentLogEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, incident_id, zone_id, metric, value, severity, transition, timestamp_ms
             FROM incident_log ORDER BY timestamp_ms DESC, id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Log entries strictly after `since_ms`, timestamp descending
    pub async fn entries_since(&self, since_ms: i64) -> Result<Vec<IncidentLogEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, incident_id, zone_id, metric, value, severity, transition, timestamp_ms
             FROM incident_log WHERE timestamp_ms > ? ORDER BY timestamp_ms DESC, id DESC",
        )
        .bind(since_ms)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Total incident count (any status)
    pub async fn incident_count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) FROM incidents")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>(0)? as u64)
    }

    /// Total audit-trail entry count
    pub async fn log_count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) FROM incident_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>(0)? as u64)
    }

    /// Clear all data (for testing)
    pub async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM incident_log")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM incidents")
            .execute(&self.pool)
            .await?;
        self.lock_cache()?.clear();
        Ok(())
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        match tokio::time::timeout(Duration::from_millis(self.write_timeout_ms), fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(self.write_timeout_ms)),
        }
    }

    fn lock_cache(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(u32, Metric), CachedOpen>>, StorageError> {
        self.open_cache
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }
}

fn parse_metric(s: String) -> Result<Metric, StorageError> {
    Metric::from_str(&s).map_err(|e| StorageError::Corrupt(e.to_string()))
}

fn parse_severity(s: String) -> Result<Severity, StorageError> {
    Severity::parse(&s).ok_or_else(|| StorageError::Corrupt(format!("unknown severity: {s}")))
}

fn parse_status(s: String) -> Result<IncidentStatus, StorageError> {
    IncidentStatus::parse(&s).ok_or_else(|| StorageError::Corrupt(format!("unknown status: {s}")))
}

fn record_from_row(row: &SqliteRow) -> Result<IncidentRecord, StorageError> {
    Ok(IncidentRecord {
        id: row.try_get("id")?,
        zone_id: row.try_get::<i64, _>("zone_id")? as u32,
        metric: parse_metric(row.try_get::<String, _>("metric")?)?,
        value: row.try_get("value")?,
        severity: parse_severity(row.try_get::<String, _>("severity")?)?,
        status: parse_status(row.try_get::<String, _>("status")?)?,
        opened_at: row.try_get("opened_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<IncidentLogEntry, StorageError> {
    Ok(IncidentLogEntry {
        id: row.try_get("id")?,
        incident_id: row.try_get("incident_id")?,
        zone_id: row.try_get::<i64, _>("zone_id")? as u32,
        metric: parse_metric(row.try_get::<String, _>("metric")?)?,
        value: row.try_get("value")?,
        severity: parse_severity(row.try_get::<String, _>("severity")?)?,
        transition: parse_status(row.try_get::<String, _>("transition")?)?,
        timestamp_ms: row.try_get("timestamp_ms")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_repo() -> IncidentRepository {
        let config = StorageConfig {
            url: "sqlite::memory:".to_string(),
            write_timeout_ms: 2_000,
        };
        IncidentRepository::connect(&config).await.unwrap()
    }

    fn aqi_open(zone_id: u32, value: f64, severity: Severity, timestamp_ms: i64) -> OpenIncident {
        OpenIncident {
            zone_id,
            metric: Metric::Aqi,
            value,
            severity,
            timestamp_ms,
        }
    }

    #[tokio::test]
    async fn test_open_creates_record_and_log_entry() {
        let repo = memory_repo().await;

        let id = repo
            .record_open(aqi_open(1, 340.0, Severity::Medium, 2_000))
            .await
            .unwrap();

        let open = repo.list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, id);
        assert_eq!(open[0].status, IncidentStatus::Open);
        assert_eq!(open[0].resolved_at, None);
        assert_eq!(repo.log_count().await.unwrap(), 1);
        assert_eq!(repo.open_id_for(1, Metric::Aqi).unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_duplicate_open_is_merged() {
        let repo = memory_repo().await;

        let first = repo
            .record_open(aqi_open(1, 340.0, Severity::Medium, 2_000))
            .await
            .unwrap();
        let second = repo
            .record_open(aqi_open(1, 335.0, Severity::Medium, 3_000))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.incident_count().await.unwrap(), 1);
        // Merge leaves the audit trail untouched
        assert_eq!(repo.log_count().await.unwrap(), 1);
        // Non-escalating duplicate keeps the original trigger value
        assert_eq!(repo.list_open().await.unwrap()[0].value, 340.0);
    }

    #[tokio::test]
    async fn test_duplicate_open_escalates_severity_upward_only() {
        let repo = memory_repo().await;

        let id = repo
            .record_open(aqi_open(1, 340.0, Severity::Medium, 2_000))
            .await
            .unwrap();
        repo.record_open(aqi_open(1, 480.0, Severity::High, 3_000))
            .await
            .unwrap();

        let open = &repo.list_open().await.unwrap()[0];
        assert_eq!(open.id, id);
        assert_eq!(open.severity, Severity::High);
        assert_eq!(open.value, 480.0);

        // A later milder excursion never de-escalates
        repo.record_open(aqi_open(1, 310.0, Severity::Low, 4_000))
            .await
            .unwrap();
        let open = &repo.list_open().await.unwrap()[0];
        assert_eq!(open.severity, Severity::High);
        assert_eq!(open.value, 480.0);
    }

    #[tokio::test]
    async fn test_resolve_lifecycle() {
        let repo = memory_repo().await;

        let id = repo
            .record_open(aqi_open(1, 340.0, Severity::Medium, 2_000))
            .await
            .unwrap();
        repo.record_resolved(id, 4_000).await.unwrap();

        assert!(repo.list_open().await.unwrap().is_empty());
        assert_eq!(repo.open_id_for(1, Metric::Aqi).unwrap(), None);

        let entries = repo.list_recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].transition, IncidentStatus::Resolved);
        assert_eq!(entries[0].timestamp_ms, 4_000);
        assert_eq!(entries[1].transition, IncidentStatus::Open);
        assert_eq!(entries[1].timestamp_ms, 2_000);
    }

    #[tokio::test]
    async fn test_resolve_is_noop_for_unknown_or_resolved() {
        let repo = memory_repo().await;

        // Unknown id
        assert!(repo.record_resolved(999, 1_000).await.is_ok());
        assert_eq!(repo.log_count().await.unwrap(), 0);

        // Already resolved
        let id = repo
            .record_open(aqi_open(1, 340.0, Severity::Medium, 2_000))
            .await
            .unwrap();
        repo.record_resolved(id, 4_000).await.unwrap();
        repo.record_resolved(id, 5_000).await.unwrap();
        assert_eq!(repo.log_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reopen_after_resolve_creates_new_incident() {
        let repo = memory_repo().await;

        let first = repo
            .record_open(aqi_open(1, 340.0, Severity::Medium, 2_000))
            .await
            .unwrap();
        repo.record_resolved(first, 4_000).await.unwrap();
        let second = repo
            .record_open(aqi_open(1, 360.0, Severity::Medium, 6_000))
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(repo.incident_count().await.unwrap(), 2);
        assert_eq!(repo.list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_entries_since_is_strictly_after() {
        let repo = memory_repo().await;

        repo.record_open(aqi_open(1, 340.0, Severity::Medium, 2_000))
            .await
            .unwrap();
        repo.record_open(OpenIncident {
            zone_id: 2,
            metric: Metric::NoiseLevel,
            value: 95.0,
            severity: Severity::Low,
            timestamp_ms: 5_000,
        })
        .await
        .unwrap();

        let entries = repo.entries_since(2_000).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].metric, Metric::NoiseLevel);
    }

    #[tokio::test]
    async fn test_pairs_are_independent() {
        let repo = memory_repo().await;

        let aqi = repo
            .record_open(aqi_open(1, 340.0, Severity::Medium, 2_000))
            .await
            .unwrap();
        let noise = repo
            .record_open(OpenIncident {
                zone_id: 1,
                metric: Metric::NoiseLevel,
                value: 95.0,
                severity: Severity::Low,
                timestamp_ms: 2_000,
            })
            .await
            .unwrap();

        assert_ne!(aqi, noise);
        assert_eq!(repo.list_open().await.unwrap().len(), 2);
    }
}
