//! Evaluator Implementation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use telemetry::{Metric, Reading, Severity, SeverityBands, Threshold, ThresholdSet};
use tracing::{debug, info};

/// Range state for one (zone, metric) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RangeState {
    #[default]
    InRange,
    OutOfRange,
}

/// What happened to a (zone, metric) pair on this tick
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionKind {
    /// Reading left the safe range for the first time
    Opened { severity: Severity },
    /// Reading returned inside the safe range
    Resolved,
}

/// A state transition, carrying the reading that triggered it
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub reading: Reading,
    pub kind: TransitionKind,
}

/// Severity from the magnitude of the excursion beyond the violated bound,
/// proportional to the threshold span and bucketed by the configured bands.
///
/// Pure function: same value and threshold always yield the same severity.
pub fn severity_for(value: f64, threshold: &Threshold, bands: &SeverityBands) -> Severity {
    let span = threshold.span();
    if span <= 0.0 {
        // Degenerate single-point range, any excursion is maximal
        return Severity::High;
    }
    let fraction = threshold.excursion(value) / span;
    if fraction >= bands.high {
        Severity::High
    } else if fraction >= bands.medium {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Per-(zone, metric) threshold state machine.
///
/// Holds exactly one entry per pair it has seen; the map is mutated only by
/// [`Evaluator::evaluate`], which the tick driver calls from a single task.
pub struct Evaluator {
    thresholds: ThresholdSet,
    bands: SeverityBands,
    states: HashMap<(u32, Metric), RangeState>,
}

impl Evaluator {
    /// Create an evaluator over a validated threshold table
    pub fn new(thresholds: ThresholdSet, bands: SeverityBands) -> Self {
        info!("creating evaluator");
        Self {
            thresholds,
            bands,
            states: HashMap::new(),
        }
    }

    /// Classify one tick's readings.
    ///
    /// Emits at most one transition per (zone, metric): `Opened` on the first
    /// out-of-range reading, `Resolved` on the first reading back inside the
    /// range, nothing while the state is unchanged. Readings for metrics with
    /// no configured threshold are skipped.
    pub fn evaluate(&mut self, readings: &[Reading]) -> Vec<Transition> {
        let mut transitions = Vec::new();

        for reading in readings {
            let Some(threshold) = self.thresholds.resolve(reading.zone_id, reading.metric)
            else {
                debug!(
                    zone_id = reading.zone_id,
                    metric = %reading.metric,
                    "no threshold configured, skipping reading"
                );
                continue;
            };

            let key = (reading.zone_id, reading.metric);
            let previous = self.states.get(&key).copied().unwrap_or_default();
            let current = if threshold.contains(reading.value) {
                RangeState::InRange
            } else {
                RangeState::OutOfRange
            };

            match (previous, current) {
                (RangeState::InRange, RangeState::OutOfRange) => {
                    let severity = severity_for(reading.value, &threshold, &self.bands);
                    debug!(
                        zone_id = reading.zone_id,
                        metric = %reading.metric,
                        value = reading.value,
                        %severity,
                        "threshold crossed"
                    );
                    transitions.push(Transition {
                        reading: reading.clone(),
                        kind: TransitionKind::Opened { severity },
                    });
                }
                (RangeState::OutOfRange, RangeState::InRange) => {
                    debug!(
                        zone_id = reading.zone_id,
                        metric = %reading.metric,
                        value = reading.value,
                        "reading back in range"
                    );
                    transitions.push(Transition {
                        reading: reading.clone(),
                        kind: TransitionKind::Resolved,
                    });
                }
                // Same state, no event
                _ => {}
            }

            self.states.insert(key, current);
        }

        transitions
    }

    /// Number of (zone, metric) pairs currently tracked
    pub fn tracked_pairs(&self) -> usize {
        self.states.len()
    }

    /// Number of pairs currently out of range
    pub fn out_of_range_pairs(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == RangeState::OutOfRange)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn aqi_only_evaluator(lower: f64, upper: f64) -> Evaluator {
        let mut global = Map::new();
        global.insert(Metric::Aqi, Threshold::new(lower, upper));
        Evaluator::new(ThresholdSet::new(global), SeverityBands::default())
    }

    fn aqi_reading(zone_id: u32, value: f64, tick: u64) -> Reading {
        Reading {
            zone_id,
            metric: Metric::Aqi,
            value,
            tick,
            timestamp_ms: tick as i64 * 1_000,
        }
    }

    #[test]
    fn test_aqi_lifecycle_scenario() {
        // Threshold [0, 300]; 250 in, 340 out, 310 still out, 280 back in
        let mut evaluator = aqi_only_evaluator(0.0, 300.0);

        assert!(evaluator.evaluate(&[aqi_reading(1, 250.0, 1)]).is_empty());

        let opened = evaluator.evaluate(&[aqi_reading(1, 340.0, 2)]);
        assert_eq!(opened.len(), 1);
        // 40-unit excursion over a 300-unit span = 13.3%, inside the medium band
        assert_eq!(
            opened[0].kind,
            TransitionKind::Opened {
                severity: Severity::Medium
            }
        );

        assert!(evaluator.evaluate(&[aqi_reading(1, 310.0, 3)]).is_empty());

        let resolved = evaluator.evaluate(&[aqi_reading(1, 280.0, 4)]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].kind, TransitionKind::Resolved);
        assert_eq!(resolved[0].reading.tick, 4);
    }

    #[test]
    fn test_consecutive_excursions_emit_one_open() {
        let mut evaluator = aqi_only_evaluator(0.0, 300.0);
        let mut total = 0;
        for tick in 1..=10 {
            total += evaluator.evaluate(&[aqi_reading(1, 400.0, tick)]).len();
        }
        assert_eq!(total, 1);
    }

    #[test]
    fn test_no_resolve_before_return_to_range() {
        let mut evaluator = aqi_only_evaluator(0.0, 300.0);
        evaluator.evaluate(&[aqi_reading(1, 340.0, 1)]);

        // Still out of range on the boundary's wrong side
        assert!(evaluator.evaluate(&[aqi_reading(1, 300.5, 2)]).is_empty());
        // Boundary itself is safe (inclusive)
        let resolved = evaluator.evaluate(&[aqi_reading(1, 300.0, 3)]);
        assert_eq!(resolved[0].kind, TransitionKind::Resolved);
    }

    #[test]
    fn test_zones_tracked_independently() {
        let mut evaluator = aqi_only_evaluator(0.0, 300.0);
        let batch = vec![aqi_reading(1, 340.0, 1), aqi_reading(2, 100.0, 1)];
        assert_eq!(evaluator.evaluate(&batch).len(), 1);

        // Zone 2 crossing later opens its own incident
        let batch = vec![aqi_reading(1, 350.0, 2), aqi_reading(2, 320.0, 2)];
        let transitions = evaluator.evaluate(&batch);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].reading.zone_id, 2);
        assert_eq!(evaluator.out_of_range_pairs(), 2);
    }

    #[test]
    fn test_below_lower_bound_opens() {
        let mut evaluator = aqi_only_evaluator(50.0, 300.0);
        let opened = evaluator.evaluate(&[aqi_reading(1, 10.0, 1)]);
        assert!(matches!(opened[0].kind, TransitionKind::Opened { .. }));
    }

    #[test]
    fn test_unconfigured_metric_is_skipped() {
        let mut evaluator = aqi_only_evaluator(0.0, 300.0);
        let reading = Reading {
            zone_id: 1,
            metric: Metric::NoiseLevel,
            value: 500.0,
            tick: 1,
            timestamp_ms: 0,
        };
        assert!(evaluator.evaluate(&[reading]).is_empty());
        assert_eq!(evaluator.tracked_pairs(), 0);
    }

    #[test]
    fn test_severity_buckets() {
        let threshold = Threshold::new(0.0, 100.0);
        let bands = SeverityBands::default();

        assert_eq!(severity_for(105.0, &threshold, &bands), Severity::Low);
        assert_eq!(severity_for(110.0, &threshold, &bands), Severity::Medium);
        assert_eq!(severity_for(129.0, &threshold, &bands), Severity::Medium);
        assert_eq!(severity_for(130.0, &threshold, &bands), Severity::High);
        assert_eq!(severity_for(-40.0, &threshold, &bands), Severity::High);
    }
}
