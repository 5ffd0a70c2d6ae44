//! Per-tick sensor readings

use crate::Metric;
use serde::{Deserialize, Serialize};

/// One metric's value for one zone at one tick.
///
/// Readings are generated fresh each tick and never mutated; the next tick's
/// reading for the same (zone, metric) supersedes this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Zone the reading belongs to
    pub zone_id: u32,
    /// Measured quantity
    pub metric: Metric,
    /// Measured value
    pub value: f64,
    /// Tick that produced the reading
    pub tick: u64,
    /// Wall-clock timestamp (Unix ms)
    pub timestamp_ms: i64,
}
