//! Per-tick zone snapshots

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use telemetry::{Metric, Reading, Zone};

/// A zone together with its latest reading per metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneReadings {
    pub zone: Zone,
    pub readings: BTreeMap<Metric, f64>,
}

/// The complete result of one tick.
///
/// Built after the full pipeline finishes and published by swapping a
/// reference, so a reader always sees every zone from the same tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Tick that produced this snapshot; 0 before the first tick
    pub tick: u64,
    /// Wall-clock timestamp of the tick (Unix ms)
    pub timestamp_ms: i64,
    /// Every configured zone with its readings
    pub zones: Vec<ZoneReadings>,
}

impl Snapshot {
    /// Pre-first-tick snapshot
    pub fn empty() -> Self {
        Self {
            tick: 0,
            timestamp_ms: 0,
            zones: Vec::new(),
        }
    }

    /// Assemble a snapshot from one tick's reading batch
    pub fn from_readings(
        tick: u64,
        timestamp_ms: i64,
        zones: &[Zone],
        readings: &[Reading],
    ) -> Self {
        let zones = zones
            .iter()
            .map(|zone| ZoneReadings {
                zone: zone.clone(),
                readings: readings
                    .iter()
                    .filter(|r| r.zone_id == zone.id)
                    .map(|r| (r.metric, r.value))
                    .collect(),
            })
            .collect();
        Self {
            tick,
            timestamp_ms,
            zones,
        }
    }
}
