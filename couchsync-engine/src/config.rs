//! Engine tuning knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of documents sampled per schema during discovery.
pub const DEFAULT_DISCOVERY_SAMPLE_SIZE: usize = 100;

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum documents inspected per schema during type inference.
    pub discovery_sample_size: usize,
    /// Writes dispatched concurrently within one write stream. Acks are
    /// still emitted in input order.
    pub max_in_flight_writes: usize,
    /// Per-request HTTP timeout (seconds).
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discovery_sample_size: DEFAULT_DISCOVERY_SAMPLE_SIZE,
            max_in_flight_writes: 1,
            request_timeout_secs: 60,
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `max_in_flight_writes`, never less than one.
    pub fn write_concurrency(&self) -> usize {
        self.max_in_flight_writes.max(1)
    }
}
