//! Synthetic Generator Implementation

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use telemetry::{ConfigError, Metric, Reading, Zone};
use tracing::{debug, info};

/// Generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Temperature bounds (°C)
    pub temperature_range: (f64, f64),
    /// Humidity bounds (%)
    pub humidity_range: (f64, f64),
    /// Wind speed bounds (m/s)
    pub wind_speed_range: (f64, f64),
    /// AQI bounds
    pub aqi_range: (f64, f64),
    /// UV index bounds
    pub uv_index_range: (f64, f64),
    /// Noise level bounds (dB)
    pub noise_level_range: (f64, f64),
    /// Fraction of the half-range used as noise amplitude, in (0, 1]
    pub noise_amplitude: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            temperature_range: (-10.0, 50.0),
            humidity_range: (0.0, 100.0),
            wind_speed_range: (0.0, 40.0),
            aqi_range: (0.0, 500.0),
            uv_index_range: (0.0, 11.0),
            noise_level_range: (30.0, 110.0),
            noise_amplitude: 1.0,
        }
    }
}

impl GeneratorConfig {
    /// Bounds for a metric
    pub fn range(&self, metric: Metric) -> (f64, f64) {
        match metric {
            Metric::Temperature => self.temperature_range,
            Metric::Humidity => self.humidity_range,
            Metric::WindSpeed => self.wind_speed_range,
            Metric::Aqi => self.aqi_range,
            Metric::UvIndex => self.uv_index_range,
            Metric::NoiseLevel => self.noise_level_range,
        }
    }

    /// Validate every configured range and the noise amplitude
    pub fn validate(&self) -> Result<(), ConfigError> {
        for metric in Metric::ALL {
            let (lower, upper) = self.range(metric);
            if lower > upper {
                return Err(ConfigError::InvalidBounds {
                    metric,
                    lower,
                    upper,
                });
            }
        }
        if self.noise_amplitude <= 0.0 || self.noise_amplitude > 1.0 {
            return Err(ConfigError::InvalidNoiseAmplitude(self.noise_amplitude));
        }
        Ok(())
    }
}

/// Synthetic reading generator.
///
/// Stateless across ticks apart from the RNG stream: each call draws fresh
/// values uniformly around the range midpoint, scaled by the noise amplitude
/// and clamped to the configured bounds.
pub struct SyntheticGenerator {
    config: GeneratorConfig,
    rng: StdRng,
}

impl SyntheticGenerator {
    /// Create a generator. A fixed seed yields an identical reading sequence
    /// on every run; `None` seeds from the OS.
    pub fn new(config: GeneratorConfig, seed: Option<u64>) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match seed {
            Some(seed) => {
                info!("seeding generator with {}", seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_entropy(),
        };
        Ok(Self { config, rng })
    }

    /// Produce one reading per (zone, metric) for this tick, ordered by zone
    /// then metric. An empty zone list yields an empty batch.
    pub fn generate(&mut self, zones: &[Zone], tick: u64, timestamp_ms: i64) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(zones.len() * Metric::ALL.len());
        for zone in zones {
            for metric in Metric::ALL {
                readings.push(Reading {
                    zone_id: zone.id,
                    metric,
                    value: self.draw(metric),
                    tick,
                    timestamp_ms,
                });
            }
        }
        debug!(tick, count = readings.len(), "generated reading batch");
        readings
    }

    fn draw(&mut self, metric: Metric) -> f64 {
        let (lower, upper) = self.config.range(metric);
        if lower == upper {
            return lower;
        }
        let mid = (lower + upper) / 2.0;
        let half = (upper - lower) / 2.0;
        let offset = self.rng.gen_range(-1.0..=1.0) * half * self.config.noise_amplitude;
        (mid + offset).clamp(lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn zones(count: u32) -> Vec<Zone> {
        (1..=count)
            .map(|id| Zone::new(id, format!("zone-{id}"), 12.9, 77.5))
            .collect()
    }

    #[test]
    fn test_one_reading_per_zone_metric_pair() {
        let mut gen = SyntheticGenerator::new(GeneratorConfig::default(), Some(7)).unwrap();
        let batch = gen.generate(&zones(3), 1, 1_000);
        assert_eq!(batch.len(), 3 * Metric::ALL.len());

        let zone_one: Vec<_> = batch.iter().filter(|r| r.zone_id == 1).collect();
        assert_eq!(zone_one.len(), Metric::ALL.len());
        for (reading, metric) in zone_one.iter().zip(Metric::ALL) {
            assert_eq!(reading.metric, metric);
        }
    }

    #[test]
    fn test_empty_zone_list_is_valid() {
        let mut gen = SyntheticGenerator::new(GeneratorConfig::default(), Some(7)).unwrap();
        assert!(gen.generate(&[], 1, 1_000).is_empty());
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let config = GeneratorConfig::default();
        let mut a = SyntheticGenerator::new(config.clone(), Some(42)).unwrap();
        let mut b = SyntheticGenerator::new(config, Some(42)).unwrap();

        for tick in 1..=20 {
            assert_eq!(
                a.generate(&zones(4), tick, 0),
                b.generate(&zones(4), tick, 0)
            );
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let config = GeneratorConfig::default();
        let mut a = SyntheticGenerator::new(config.clone(), Some(1)).unwrap();
        let mut b = SyntheticGenerator::new(config, Some(2)).unwrap();
        assert_ne!(a.generate(&zones(4), 1, 0), b.generate(&zones(4), 1, 0));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let config = GeneratorConfig {
            aqi_range: (500.0, 0.0),
            ..Default::default()
        };
        assert!(SyntheticGenerator::new(config, Some(1)).is_err());
    }

    #[test]
    fn test_rejects_zero_noise_amplitude() {
        let config = GeneratorConfig {
            noise_amplitude: 0.0,
            ..Default::default()
        };
        assert!(SyntheticGenerator::new(config, Some(1)).is_err());
    }

    proptest! {
        #[test]
        fn prop_values_stay_within_bounds(seed in any::<u64>(), ticks in 1u64..10) {
            let config = GeneratorConfig::default();
            let mut gen = SyntheticGenerator::new(config.clone(), Some(seed)).unwrap();
            for tick in 1..=ticks {
                for reading in gen.generate(&zones(3), tick, 0) {
                    let (lower, upper) = config.range(reading.metric);
                    prop_assert!(reading.value >= lower && reading.value <= upper);
                }
            }
        }
    }
}
