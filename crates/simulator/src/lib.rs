//! Synthetic Data Generator
//!
//! Fabricates one reading per (zone, metric) per tick from bounded
//! per-metric distributions. Deterministic for a fixed seed.

mod generator;

pub use generator::{GeneratorConfig, SyntheticGenerator};
