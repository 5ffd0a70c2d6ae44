//! Application Configuration
//!
//! Loaded once at startup from an optional config file plus `ZONEWATCH_*`
//! environment overrides. Every component reads its knobs from here; nothing
//! is mutated at runtime.

use crate::rate_limit::RateLimitConfig;
use ::config::{Config, Environment, File};
use scheduler::DriverConfig;
use serde::{Deserialize, Serialize};
use simulator::GeneratorConfig;
use std::collections::HashMap;
use storage::StorageConfig;
use telemetry::{ConfigError, Metric, SeverityBands, Threshold, ThresholdSet, Zone};

/// One per-zone threshold override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneThreshold {
    pub zone_id: u32,
    pub metric: Metric,
    pub lower: f64,
    pub upper: f64,
}

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Bind address for the HTTP server
    pub listen_addr: String,
    /// Generator seed; set for deterministic runs
    pub seed: Option<u64>,
    /// Monitored zones, immutable after startup
    pub zones: Vec<Zone>,
    /// Global safe ranges; empty means built-in defaults
    pub thresholds: HashMap<Metric, Threshold>,
    /// Per-zone threshold overrides
    pub threshold_overrides: Vec<ZoneThreshold>,
    /// Severity bucket boundaries
    pub severity_bands: SeverityBands,
    /// Synthetic generator bounds and noise
    pub generator: GeneratorConfig,
    /// Tick driver timing and retry policy
    pub driver: DriverConfig,
    /// Incident store location and write timeout
    pub storage: StorageConfig,
    /// Polling endpoint rate limits
    pub rate_limit: RateLimitConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            seed: None,
            zones: default_zones(),
            thresholds: HashMap::new(),
            threshold_overrides: Vec::new(),
            severity_bands: SeverityBands::default(),
            generator: GeneratorConfig::default(),
            driver: DriverConfig::default(),
            storage: StorageConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Built-in demo zones used when no config file provides any
fn default_zones() -> Vec<Zone> {
    vec![
        Zone::new(1, "Riverside", 12.9716, 77.5946),
        Zone::new(2, "Industrial Park", 12.9141, 77.6411),
        Zone::new(3, "Old Town", 12.9982, 77.5530),
    ]
}

impl AppConfig {
    /// Load configuration from `config/zonewatch.*` (if present) layered
    /// under `ZONEWATCH_*` environment variables.
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/zonewatch").required(false))
            .add_source(Environment::with_prefix("ZONEWATCH").separator("__"))
            .build()?;
        settings.try_deserialize()
    }

    /// Assemble the effective threshold table
    pub fn threshold_set(&self) -> ThresholdSet {
        let mut set = if self.thresholds.is_empty() {
            ThresholdSet::default()
        } else {
            ThresholdSet::new(self.thresholds.clone())
        };
        for o in &self.threshold_overrides {
            set.set_override(o.zone_id, o.metric, Threshold::new(o.lower, o.upper));
        }
        set
    }

    /// Validate everything that would make the pipeline unsound.
    ///
    /// Called once at startup; failures here are fatal. An empty zone list is
    /// deliberately allowed (valid degenerate case).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for zone in &self.zones {
            if !seen.insert(zone.id) {
                return Err(ConfigError::DuplicateZone(zone.id));
            }
        }
        self.threshold_set().validate()?;
        self.generator.validate()?;
        self.severity_bands.validate()?;
        Ok(())
    }
}
