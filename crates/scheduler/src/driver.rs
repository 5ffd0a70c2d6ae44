//! Tick Driver Implementation

use crate::Snapshot;
use alerting::{Evaluator, Transition, TransitionKind};
use serde::{Deserialize, Serialize};
use simulator::SyntheticGenerator;
use std::sync::Arc;
use std::time::Duration;
use storage::{IncidentRepository, OpenIncident, StorageError};
use telemetry::Zone;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Configuration for the tick driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Interval between ticks (ms)
    pub tick_interval_ms: u64,
    /// Persistence attempts per incident event before it is dropped
    pub persist_retries: u8,
    /// Linear backoff base between persistence attempts (ms)
    pub retry_backoff_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5_000,
            persist_retries: 3,
            retry_backoff_ms: 100,
        }
    }
}

/// Handle held by the host process: snapshot subscription plus clean stop
pub struct DriverHandle {
    shutdown_tx: watch::Sender<bool>,
    snapshot_rx: watch::Receiver<Arc<Snapshot>>,
}

impl DriverHandle {
    /// Signal the driver to stop after its in-flight tick completes
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Subscribe to published snapshots
    pub fn snapshot_rx(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_rx.clone()
    }
}

/// Periodic driver running the generate → evaluate → persist pipeline.
///
/// Single-threaded with respect to the pipeline: there is never more than
/// one tick in flight, and the evaluator's state map is touched only here.
/// The snapshot is published only after persistence completes, so pollers
/// see either the pre-tick or the post-tick state.
pub struct TickDriver {
    zones: Vec<Zone>,
    generator: SyntheticGenerator,
    evaluator: Evaluator,
    repository: Arc<IncidentRepository>,
    config: DriverConfig,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    shutdown_rx: watch::Receiver<bool>,
    tick: u64,
}

impl TickDriver {
    /// Create a driver and the handle used to observe and stop it
    pub fn new(
        zones: Vec<Zone>,
        generator: SyntheticGenerator,
        evaluator: Evaluator,
        repository: Arc<IncidentRepository>,
        config: DriverConfig,
    ) -> (Self, DriverHandle) {
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(Snapshot::empty()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let driver = Self {
            zones,
            generator,
            evaluator,
            repository,
            config,
            snapshot_tx,
            shutdown_rx,
            tick: 0,
        };
        let handle = DriverHandle {
            shutdown_tx,
            snapshot_rx,
        };
        (driver, handle)
    }

    /// Run until shutdown is signalled. An in-flight tick always finishes
    /// before the loop exits, so no evaluator transition is left unrecorded.
    pub async fn run(mut self) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            zones = self.zones.len(),
            interval_ms = self.config.tick_interval_ms,
            "tick driver started"
        );

        loop {
            tokio::select! {
                // Shutdown wins over a due tick, but never interrupts one
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.run_tick().await;
                }
            }
        }

        info!(tick = self.tick, "tick driver stopped");
    }

    async fn run_tick(&mut self) {
        self.tick += 1;
        let timestamp_ms = chrono::Utc::now().timestamp_millis();

        let readings = self
            .generator
            .generate(&self.zones, self.tick, timestamp_ms);
        let transitions = self.evaluator.evaluate(&readings);

        for transition in &transitions {
            self.persist_transition(transition).await;
        }

        let snapshot = Snapshot::from_readings(self.tick, timestamp_ms, &self.zones, &readings);
        let _ = self.snapshot_tx.send(Arc::new(snapshot));

        metrics::counter!("zonewatch_ticks_total").increment(1);
        metrics::gauge!("zonewatch_out_of_range_pairs")
            .set(self.evaluator.out_of_range_pairs() as f64);
        debug!(
            tick = self.tick,
            readings = readings.len(),
            transitions = transitions.len(),
            "tick complete"
        );
    }

    /// Persist one transition with bounded retry; on exhaustion the event is
    /// logged and dropped so the loop continues to the next tick.
    async fn persist_transition(&self, transition: &Transition) {
        let reading = &transition.reading;
        let retries = self.config.persist_retries.max(1);

        for attempt in 1..=retries {
            match self.apply_transition(transition).await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(
                            zone_id = reading.zone_id,
                            metric = %reading.metric,
                            attempt,
                            "persist recovered after retry"
                        );
                    }
                    return;
                }
                Err(e) if attempt < retries => {
                    warn!(
                        zone_id = reading.zone_id,
                        metric = %reading.metric,
                        tick = reading.tick,
                        attempt,
                        error = %e,
                        "persist failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(
                        self.config.retry_backoff_ms * attempt as u64,
                    ))
                    .await;
                }
                Err(e) => {
                    metrics::counter!("zonewatch_incident_events_dropped_total").increment(1);
                    error!(
                        zone_id = reading.zone_id,
                        metric = %reading.metric,
                        tick = reading.tick,
                        value = reading.value,
                        error = %e,
                        "incident event dropped after {retries} attempts"
                    );
                }
            }
        }
    }

    async fn apply_transition(&self, transition: &Transition) -> Result<(), StorageError> {
        let reading = &transition.reading;
        match &transition.kind {
            TransitionKind::Opened { severity } => self
                .repository
                .record_open(OpenIncident {
                    zone_id: reading.zone_id,
                    metric: reading.metric,
                    value: reading.value,
                    severity: *severity,
                    timestamp_ms: reading.timestamp_ms,
                })
                .await
                .map(|_| ()),
            TransitionKind::Resolved => {
                match self
                    .repository
                    .open_id_for(reading.zone_id, reading.metric)?
                {
                    Some(id) => self.repository.record_resolved(id, reading.timestamp_ms).await,
                    None => {
                        debug!(
                            zone_id = reading.zone_id,
                            metric = %reading.metric,
                            "resolve with no open incident, skipping"
                        );
                        Ok(())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simulator::GeneratorConfig;
    use telemetry::{Metric, SeverityBands, ThresholdSet};

    // Constant generator output so every tick is predictable: all metrics
    // pinned inside their default safe range except AQI.
    fn pinned_config(aqi: f64) -> GeneratorConfig {
        GeneratorConfig {
            temperature_range: (20.0, 20.0),
            humidity_range: (50.0, 50.0),
            wind_speed_range: (5.0, 5.0),
            aqi_range: (aqi, aqi),
            uv_index_range: (3.0, 3.0),
            noise_level_range: (60.0, 60.0),
            noise_amplitude: 1.0,
        }
    }

    async fn driver_with_aqi(aqi: f64) -> (TickDriver, DriverHandle) {
        let repository = Arc::new(
            IncidentRepository::connect(&storage::StorageConfig {
                url: "sqlite::memory:".to_string(),
                write_timeout_ms: 2_000,
            })
            .await
            .unwrap(),
        );
        let generator = SyntheticGenerator::new(pinned_config(aqi), Some(1)).unwrap();
        let evaluator = Evaluator::new(ThresholdSet::default(), SeverityBands::default());
        let zones = vec![
            Zone::new(1, "north", 12.97, 77.59),
            Zone::new(2, "south", 12.91, 77.60),
        ];
        TickDriver::new(zones, generator, evaluator, repository, DriverConfig::default())
    }

    #[tokio::test]
    async fn test_snapshot_published_only_after_full_tick() {
        let (mut driver, handle) = driver_with_aqi(120.0).await;
        let rx = handle.snapshot_rx();

        assert_eq!(rx.borrow().tick, 0);

        driver.run_tick().await;

        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.zones.len(), 2);
        for zone in &snapshot.zones {
            assert_eq!(zone.readings.len(), Metric::ALL.len());
        }
    }

    #[tokio::test]
    async fn test_excursion_opens_one_incident_per_zone() {
        // AQI pinned at 400 against the default [0, 150] threshold
        let (mut driver, _handle) = driver_with_aqi(400.0).await;

        driver.run_tick().await;
        driver.run_tick().await;
        driver.run_tick().await;

        let open = driver.repository.list_open().await.unwrap();
        assert_eq!(open.len(), 2);
        // Repeated excursions never re-open
        assert_eq!(driver.repository.log_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_return_to_range_resolves() {
        let (mut driver, _handle) = driver_with_aqi(400.0).await;
        driver.run_tick().await;
        assert_eq!(driver.repository.list_open().await.unwrap().len(), 2);

        // Swap in a generator producing safe AQI values
        driver.generator = SyntheticGenerator::new(pinned_config(100.0), Some(1)).unwrap();
        driver.run_tick().await;

        assert!(driver.repository.list_open().await.unwrap().is_empty());
        // One open + one resolve entry per zone
        assert_eq!(driver.repository.log_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_shutdown_lets_driver_exit() {
        let (driver, handle) = driver_with_aqi(120.0).await;
        let task = tokio::spawn(driver.run());

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("driver did not stop after shutdown")
            .unwrap();
    }
}
