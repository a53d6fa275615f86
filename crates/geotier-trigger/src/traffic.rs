//! Traffic sources feeding telemetry locations into trigger evaluation.

use std::sync::{Arc, RwLock};

use geotier_core::GeoPoint;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Supplies the telemetry-derived hot locations for one tick.
pub trait TrafficSource: Send + Sync {
    fn hot_locations(&self) -> Vec<GeoPoint>;
}

/// No telemetry at all; only simulated overrides trigger tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTelemetry;

impl TrafficSource for NoTelemetry {
    fn hot_locations(&self) -> Vec<GeoPoint> {
        Vec::new()
    }
}

/// Observed client traffic attributed to one location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficSample {
    pub point: GeoPoint,
    pub bytes_per_sec: u64,
}

/// Holds the latest externally reported samples and filters them by
/// absolute and relative thresholds. Clones share the same samples.
#[derive(Debug, Clone, Default)]
pub struct SampledTraffic {
    samples: Arc<RwLock<Vec<TrafficSample>>>,
    threshold_bytes: u64,
    threshold_ratio: f64,
}

impl SampledTraffic {
    pub fn new(threshold_bytes: u64, threshold_ratio: f64) -> Self {
        Self {
            samples: Arc::default(),
            threshold_bytes,
            threshold_ratio,
        }
    }

    /// Replace the current sample set.
    pub fn report(&self, samples: Vec<TrafficSample>) {
        debug!(count = samples.len(), "traffic samples reported");
        let mut guard = self.samples.write().unwrap_or_else(|e| e.into_inner());
        *guard = samples;
    }

    pub fn samples(&self) -> Vec<TrafficSample> {
        self.samples
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl TrafficSource for SampledTraffic {
    /// Samples carrying at least `threshold_bytes` and at least
    /// `threshold_ratio` of the total sampled traffic.
    fn hot_locations(&self) -> Vec<GeoPoint> {
        let samples = self.samples.read().unwrap_or_else(|e| e.into_inner());
        let total: u64 = samples.iter().map(|s| s.bytes_per_sec).sum();
        samples
            .iter()
            .filter(|s| s.bytes_per_sec >= self.threshold_bytes)
            .filter(|s| {
                let share = if total == 0 {
                    0.0
                } else {
                    s.bytes_per_sec as f64 / total as f64
                };
                share >= self.threshold_ratio
            })
            .map(|s| s.point)
            .collect()
    }
}
