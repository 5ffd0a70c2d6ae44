//! Safe-Range Thresholds and Severity
//!
//! Thresholds define the inclusive safe range per metric. A global table
//! applies to every zone unless a per-zone override is configured.

use crate::{ConfigError, Metric};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inclusive safe range for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Safe-range lower bound
    pub lower: f64,
    /// Safe-range upper bound
    pub upper: f64,
}

impl Threshold {
    /// Create a new threshold
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Whether a value sits inside the safe range, boundary inclusive
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Distance beyond the violated bound, 0.0 for in-range values
    pub fn excursion(&self, value: f64) -> f64 {
        if value < self.lower {
            self.lower - value
        } else if value > self.upper {
            value - self.upper
        } else {
            0.0
        }
    }

    /// Width of the safe range
    pub fn span(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Incident severity, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Stable identifier used in JSON and SQL
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Parse the stable identifier back into a severity
    pub fn parse(s: &str) -> Option<Severity> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket boundaries for severity, as excursion fractions of the threshold span
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityBands {
    /// Excursion fraction at which severity becomes Medium
    pub medium: f64,
    /// Excursion fraction at which severity becomes High
    pub high: f64,
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            medium: 0.10,
            high: 0.30,
        }
    }
}

impl SeverityBands {
    /// Check band ordering
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.medium <= 0.0 || self.high <= self.medium {
            return Err(ConfigError::InvalidSeverityBands {
                medium: self.medium,
                high: self.high,
            });
        }
        Ok(())
    }
}

/// Threshold table: one safe range per metric, with optional per-zone overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSet {
    /// Global thresholds applying to every zone
    global: HashMap<Metric, Threshold>,
    /// Per-zone overrides, consulted before the global table
    overrides: HashMap<u32, HashMap<Metric, Threshold>>,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        let mut global = HashMap::new();
        global.insert(Metric::Temperature, Threshold::new(-10.0, 40.0));
        global.insert(Metric::Humidity, Threshold::new(10.0, 95.0));
        global.insert(Metric::WindSpeed, Threshold::new(0.0, 20.0));
        global.insert(Metric::Aqi, Threshold::new(0.0, 150.0));
        global.insert(Metric::UvIndex, Threshold::new(0.0, 8.0));
        global.insert(Metric::NoiseLevel, Threshold::new(0.0, 85.0));
        Self {
            global,
            overrides: HashMap::new(),
        }
    }
}

impl ThresholdSet {
    /// Build a set from a global table only
    pub fn new(global: HashMap<Metric, Threshold>) -> Self {
        Self {
            global,
            overrides: HashMap::new(),
        }
    }

    /// Add a per-zone override for one metric
    pub fn set_override(&mut self, zone_id: u32, metric: Metric, threshold: Threshold) {
        self.overrides
            .entry(zone_id)
            .or_default()
            .insert(metric, threshold);
    }

    /// Resolve the effective threshold for a (zone, metric) pair.
    ///
    /// Returns `None` when the metric has no configured safe range at all.
    pub fn resolve(&self, zone_id: u32, metric: Metric) -> Option<Threshold> {
        self.overrides
            .get(&zone_id)
            .and_then(|m| m.get(&metric))
            .or_else(|| self.global.get(&metric))
            .copied()
    }

    /// Validate every configured range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global.is_empty() {
            return Err(ConfigError::EmptyThresholds);
        }
        let overrides = self
            .overrides
            .values()
            .flat_map(|m| m.iter());
        for (&metric, t) in self.global.iter().chain(overrides) {
            if t.lower > t.upper {
                return Err(ConfigError::InvalidThreshold {
                    metric,
                    lower: t.lower,
                    upper: t.upper,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_boundary_inclusive() {
        let t = Threshold::new(0.0, 150.0);
        assert!(t.contains(0.0));
        assert!(t.contains(150.0));
        assert!(!t.contains(150.01));
        assert!(!t.contains(-0.01));
    }

    #[test]
    fn test_excursion() {
        let t = Threshold::new(0.0, 300.0);
        assert_eq!(t.excursion(340.0), 40.0);
        assert_eq!(t.excursion(-10.0), 10.0);
        assert_eq!(t.excursion(150.0), 0.0);
    }

    #[test]
    fn test_override_wins_over_global() {
        let mut set = ThresholdSet::default();
        set.set_override(7, Metric::Aqi, Threshold::new(0.0, 50.0));

        assert_eq!(set.resolve(7, Metric::Aqi).unwrap().upper, 50.0);
        assert_eq!(set.resolve(1, Metric::Aqi).unwrap().upper, 150.0);
        // Other metrics for the overridden zone still fall through
        assert_eq!(set.resolve(7, Metric::UvIndex).unwrap().upper, 8.0);
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut set = ThresholdSet::default();
        set.set_override(1, Metric::Humidity, Threshold::new(90.0, 10.0));
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_table() {
        let set = ThresholdSet::new(HashMap::new());
        assert!(matches!(set.validate(), Err(ConfigError::EmptyThresholds)));
    }

    #[test]
    fn test_severity_bands_validation() {
        assert!(SeverityBands::default().validate().is_ok());
        let bad = SeverityBands {
            medium: 0.5,
            high: 0.2,
        };
        assert!(bad.validate().is_err());
    }
}
