//! Relay statistics

pub mod metrics;

pub use metrics::{DirectorySnapshot, RelayCounters, RelayStats, StatusReport};
