//! Environmental Metric Definitions
//!
//! The closed set of measured quantities, with their stable string form
//! used in JSON payloads and database columns.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environmental quantities measured for every zone
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Air temperature (°C)
    Temperature,
    /// Relative humidity (%)
    Humidity,
    /// Wind speed (m/s)
    WindSpeed,
    /// Air quality index (0-500)
    Aqi,
    /// UV index (0-11)
    UvIndex,
    /// Ambient noise level (dB)
    NoiseLevel,
}

/// Parse failure for a metric string from the wire or database
#[derive(Debug, Clone, Error)]
#[error("unknown metric: {0}")]
pub struct UnknownMetric(pub String);

impl Metric {
    /// All metrics, in reading order
    pub const ALL: [Metric; 6] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::WindSpeed,
        Metric::Aqi,
        Metric::UvIndex,
        Metric::NoiseLevel,
    ];

    /// Stable identifier used in JSON and SQL
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::WindSpeed => "wind_speed",
            Metric::Aqi => "aqi",
            Metric::UvIndex => "uv_index",
            Metric::NoiseLevel => "noise_level",
        }
    }

    /// Display unit for the metric
    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::Humidity => "%",
            Metric::WindSpeed => "m/s",
            Metric::Aqi => "",
            Metric::UvIndex => "",
            Metric::NoiseLevel => "dB",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(Metric::Temperature),
            "humidity" => Ok(Metric::Humidity),
            "wind_speed" => Ok(Metric::WindSpeed),
            "aqi" => Ok(Metric::Aqi),
            "uv_index" => Ok(Metric::UvIndex),
            "noise_level" => Ok(Metric::NoiseLevel),
            other => Err(UnknownMetric(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_metrics() {
        for metric in Metric::ALL {
            let parsed: Metric = metric.as_str().parse().unwrap();
            assert_eq!(parsed, metric);
        }
    }

    #[test]
    fn test_unknown_metric() {
        assert!("co2".parse::<Metric>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&Metric::WindSpeed).unwrap();
        assert_eq!(json, "\"wind_speed\"");
    }
}
