//! Trigger evaluation over one association snapshot.

use geotier_core::{GeoPoint, PoolName, RuleName, distance_miles};
use geotier_state::{AssociationSnapshot, RegisteredLocation, TierKey};
use tracing::debug;

/// Whether one `(pool, rule)` pair should have an active cache tier now.
#[derive(Debug, Clone, PartialEq)]
pub struct PairDecision {
    pub pool: PoolName,
    pub rule: RuleName,
    /// Some hot location lies within a registered radius for the rule.
    pub triggered: bool,
    /// Auto-provisioning is permitted for the rule.
    pub enabled: bool,
}

impl PairDecision {
    pub fn key(&self) -> TierKey {
        TierKey::new(&self.rule, &self.pool)
    }

    /// Triggered, and a new tier may be created for it.
    pub fn wants_provisioning(&self) -> bool {
        self.triggered && self.enabled
    }
}

/// Stateless evaluator. Holds no per-pair memory; cooldown lives in the
/// tier records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerEvaluator;

impl TriggerEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Produce one decision per associated pair whose rule has at least
    /// one registered location. Pairs are returned in pool, then rule order.
    pub fn evaluate(&self, snapshot: &AssociationSnapshot, telemetry: &[GeoPoint]) -> Vec<PairDecision> {
        let hot: Vec<GeoPoint> = snapshot
            .overrides
            .points
            .iter()
            .chain(telemetry)
            .copied()
            .collect();

        let mut decisions = Vec::new();
        for (pool, rule) in snapshot.pools.pairs() {
            let registered = snapshot.locations.locations_for(rule);
            if registered.is_empty() {
                continue;
            }
            let triggered = any_within(registered, &hot);
            let enabled = snapshot.enabled.is_enabled(rule);
            if triggered {
                debug!(%pool, %rule, enabled, "pair triggered");
            }
            decisions.push(PairDecision {
                pool: pool.to_string(),
                rule: rule.to_string(),
                triggered,
                enabled,
            });
        }
        decisions
    }
}

/// True if any hot point is within the radius of any registered location.
/// A point exactly on the radius counts.
pub fn any_within(registered: &[RegisteredLocation], hot: &[GeoPoint]) -> bool {
    registered.iter().any(|loc| {
        hot.iter()
            .any(|&p| distance_miles(loc.point, p) <= loc.proximity_miles)
    })
}
