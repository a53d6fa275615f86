//! Domain types for the geotier association store.
//!
//! One type per persisted collection. Mutators keep each collection's
//! invariants so callers never have to check for duplicates themselves.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use geotier_core::{GeoPoint, PoolName, RuleName};
use serde::{Deserialize, Serialize};

// ── Pool associations ──────────────────────────────────────────────

/// Backing pool → placement rules to use for its cache tiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolAssociations {
    pub pools: BTreeMap<PoolName, BTreeSet<RuleName>>,
}

impl PoolAssociations {
    /// Associate `pool` with `rule`. Returns false if already associated.
    pub fn insert(&mut self, pool: &str, rule: &str) -> bool {
        self.pools
            .entry(pool.to_string())
            .or_default()
            .insert(rule.to_string())
    }

    /// Drop the association. Returns false if it did not exist.
    pub fn remove(&mut self, pool: &str, rule: &str) -> bool {
        let Some(rules) = self.pools.get_mut(pool) else {
            return false;
        };
        let removed = rules.remove(rule);
        if rules.is_empty() {
            self.pools.remove(pool);
        }
        removed
    }

    pub fn contains(&self, pool: &str, rule: &str) -> bool {
        self.pools.get(pool).is_some_and(|r| r.contains(rule))
    }

    /// Every `(pool, rule)` pair in pool, then rule order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pools
            .iter()
            .flat_map(|(pool, rules)| rules.iter().map(move |r| (pool.as_str(), r.as_str())))
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

// ── Location associations ──────────────────────────────────────────

/// A registered location and the radius within which traffic triggers it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegisteredLocation {
    pub point: GeoPoint,
    pub proximity_miles: f64,
}

/// What `LocationAssociations::upsert` did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationUpsert {
    Added,
    Updated { previous_miles: f64 },
    Unchanged,
}

/// Placement rule → ordered registered locations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationAssociations {
    pub rules: BTreeMap<RuleName, Vec<RegisteredLocation>>,
}

impl LocationAssociations {
    /// Register `point` for `rule`, or update its radius if the exact
    /// coordinate is already registered.
    pub fn upsert(&mut self, rule: &str, point: GeoPoint, proximity_miles: f64) -> LocationUpsert {
        let locations = self.rules.entry(rule.to_string()).or_default();
        match locations.iter_mut().find(|l| l.point == point) {
            Some(existing) if existing.proximity_miles == proximity_miles => LocationUpsert::Unchanged,
            Some(existing) => {
                let previous_miles = existing.proximity_miles;
                existing.proximity_miles = proximity_miles;
                LocationUpsert::Updated { previous_miles }
            }
            None => {
                locations.push(RegisteredLocation {
                    point,
                    proximity_miles,
                });
                LocationUpsert::Added
            }
        }
    }

    /// Remove a registered coordinate. Returns false if it was not registered.
    pub fn remove(&mut self, rule: &str, point: GeoPoint) -> bool {
        let Some(locations) = self.rules.get_mut(rule) else {
            return false;
        };
        let before = locations.len();
        locations.retain(|l| l.point != point);
        let removed = locations.len() != before;
        if locations.is_empty() {
            self.rules.remove(rule);
        }
        removed
    }

    pub fn locations_for(&self, rule: &str) -> &[RegisteredLocation] {
        self.rules.get(rule).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, rule: &str, point: GeoPoint) -> Option<&RegisteredLocation> {
        self.locations_for(rule).iter().find(|l| l.point == point)
    }

    pub fn has_rule(&self, rule: &str) -> bool {
        !self.locations_for(rule).is_empty()
    }

    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        for (rule, locations) in &self.rules {
            for (i, loc) in locations.iter().enumerate() {
                if !loc.point.is_valid() {
                    return Err(format!("rule {rule}: invalid coordinate {}", loc.point));
                }
                if !loc.proximity_miles.is_finite() || loc.proximity_miles < 0.0 {
                    return Err(format!(
                        "rule {rule}: invalid proximity {} at {}",
                        loc.proximity_miles, loc.point
                    ));
                }
                if locations[..i].iter().any(|l| l.point == loc.point) {
                    return Err(format!("rule {rule}: duplicate coordinate {}", loc.point));
                }
            }
        }
        Ok(())
    }
}

// ── Enable flags ───────────────────────────────────────────────────

/// Placement rule → whether triggers may provision new tiers. Absent = false.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnableFlags {
    pub rules: BTreeMap<RuleName, bool>,
}

impl EnableFlags {
    pub fn set(&mut self, rule: &str, enabled: bool) {
        self.rules.insert(rule.to_string(), enabled);
    }

    pub fn is_enabled(&self, rule: &str) -> bool {
        self.rules.get(rule).copied().unwrap_or(false)
    }
}

// ── Override locations ─────────────────────────────────────────────

/// Operator-simulated hot client locations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideLocations {
    pub points: Vec<GeoPoint>,
}

impl OverrideLocations {
    /// Returns false if the point was already simulated.
    pub fn add(&mut self, point: GeoPoint) -> bool {
        if self.contains(point) {
            return false;
        }
        self.points.push(point);
        true
    }

    /// Returns false if the point was not simulated.
    pub fn remove(&mut self, point: GeoPoint) -> bool {
        let before = self.points.len();
        self.points.retain(|p| *p != point);
        self.points.len() != before
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        self.points.contains(&point)
    }

    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        for (i, p) in self.points.iter().enumerate() {
            if !p.is_valid() {
                return Err(format!("invalid coordinate {p}"));
            }
            if self.points[..i].contains(p) {
                return Err(format!("duplicate coordinate {p}"));
            }
        }
        Ok(())
    }
}

// ── Cache tier records ─────────────────────────────────────────────

/// Lifecycle state of a cache tier. A removed tier has no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierState {
    Startup,
    Active,
    Teardown,
    Draining,
    Empty,
}

impl TierState {
    pub const ALL: [TierState; 5] = [
        TierState::Startup,
        TierState::Active,
        TierState::Teardown,
        TierState::Draining,
        TierState::Empty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierState::Startup => "startup",
            TierState::Active => "active",
            TierState::Teardown => "teardown",
            TierState::Draining => "draining",
            TierState::Empty => "empty",
        }
    }
}

impl fmt::Display for TierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a cache tier: one per (placement rule, backing pool).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TierKey {
    pub rule: RuleName,
    pub pool: PoolName,
}

impl TierKey {
    pub fn new(rule: &str, pool: &str) -> Self {
        Self {
            rule: rule.to_string(),
            pool: pool.to_string(),
        }
    }
}

impl fmt::Display for TierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.rule, self.pool)
    }
}

/// Authoritative status of one cache tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheTierRecord {
    pub placement_rule: RuleName,
    pub backing_pool: PoolName,
    /// `backing_pool` + configured suffix.
    pub cache_pool: String,
    pub state: TierState,
    /// Unix seconds of the last state change or cooldown refresh.
    pub last_transition_time: u64,
}

impl CacheTierRecord {
    /// A fresh record in `startup`.
    pub fn new(rule: &str, backing_pool: &str, suffix: &str, now: u64) -> Self {
        Self {
            placement_rule: rule.to_string(),
            backing_pool: backing_pool.to_string(),
            cache_pool: format!("{backing_pool}{suffix}"),
            state: TierState::Startup,
            last_transition_time: now,
        }
    }

    pub fn key(&self) -> TierKey {
        TierKey::new(&self.placement_rule, &self.backing_pool)
    }

    fn matches(&self, key: &TierKey) -> bool {
        self.placement_rule == key.rule && self.backing_pool == key.pool
    }
}

/// Every cache tier record currently known, at most one per key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierStatusTable {
    pub records: Vec<CacheTierRecord>,
}

impl TierStatusTable {
    pub fn get(&self, key: &TierKey) -> Option<&CacheTierRecord> {
        self.records.iter().find(|r| r.matches(key))
    }

    pub fn get_mut(&mut self, key: &TierKey) -> Option<&mut CacheTierRecord> {
        self.records.iter_mut().find(|r| r.matches(key))
    }

    pub fn contains(&self, key: &TierKey) -> bool {
        self.get(key).is_some()
    }

    /// Insert a record whose key is free. Returns false (and drops the
    /// record) if a record with the same key already exists.
    pub fn insert(&mut self, record: CacheTierRecord) -> bool {
        if self.contains(&record.key()) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn remove(&mut self, key: &TierKey) -> Option<CacheTierRecord> {
        let idx = self.records.iter().position(|r| r.matches(key))?;
        Some(self.records.remove(idx))
    }

    pub fn keys(&self) -> Vec<TierKey> {
        self.records.iter().map(CacheTierRecord::key).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheTierRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_in(&self, state: TierState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for r in &self.records {
            if !seen.insert(r.key()) {
                return Err(format!("duplicate tier record {}", r.key()));
            }
        }
        Ok(())
    }
}
