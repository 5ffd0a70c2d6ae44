//! Monitored zone definitions

use serde::{Deserialize, Serialize};

/// A configured geographic area under monitoring.
///
/// Zones are built from static configuration at process start and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Unique stable identifier
    pub id: u32,
    /// Display name
    pub name: String,
    /// Latitude (degrees)
    pub lat: f64,
    /// Longitude (degrees)
    pub lon: f64,
}

impl Zone {
    /// Create a new zone
    pub fn new(id: u32, name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id,
            name: name.into(),
            lat,
            lon,
        }
    }
}
