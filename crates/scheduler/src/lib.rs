//! Tick Scheduler
//!
//! Drives the generate → evaluate → persist pipeline on a fixed interval and
//! publishes an atomic per-tick snapshot for concurrent pollers.

mod driver;
mod feed;
mod snapshot;

pub use driver::{DriverConfig, DriverHandle, TickDriver};
pub use feed::IncidentFeed;
pub use snapshot::{Snapshot, ZoneReadings};
