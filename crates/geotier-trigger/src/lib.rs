//! geotier-trigger — decides which (pool, rule) pairs want a cache tier.
//!
//! Each tick the evaluator compares every location registered for a
//! placement rule against the current traffic signal: the operator's
//! simulated overrides plus whatever a [`TrafficSource`] reports.
//!
//! ```text
//! for (pool, rule) in pool_associations:
//!     if rule has no registered locations: skip
//!     triggered = any registered (point, radius) for rule
//!                 has distance(point, hot) <= radius
//!                 for some hot in overrides ∪ telemetry
//! ```
//!
//! Several hot locations near the same pair collapse into a single
//! triggered decision.

pub mod evaluator;
pub mod traffic;

pub use evaluator::{PairDecision, TriggerEvaluator};
pub use traffic::{NoTelemetry, SampledTraffic, TrafficSample, TrafficSource};
