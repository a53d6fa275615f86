//! Operator commands against the association store.
//!
//! Every command answers with a [`CommandResult`]: a status code, a
//! one-line message and, for listings, a rendered text table. Unknown
//! names and unresolvable locations are rejected before anything is
//! written. Store and topology failures are reported as [`AdminError`].

use std::sync::{Arc, Mutex};

use geotier_cluster::{ClusterError, ClusterTopology, GeocodedLocation, Geocoder};
use geotier_core::GeoPoint;
use geotier_state::{
    AssociationStore, CacheTierRecord, EnableFlags, LocationAssociations, LocationUpsert,
    OverrideLocations, PoolAssociations, StateError,
};
use serde::Serialize;
use tracing::info;

use crate::render::Table;

/// Outcome class of an operator command, with its errno-style code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Success,
    InvalidArgument,
    NotFound,
}

impl CommandStatus {
    pub fn code(&self) -> i32 {
        match self {
            CommandStatus::Success => 0,
            CommandStatus::InvalidArgument => -22,
            CommandStatus::NotFound => -2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
}

impl CommandResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self::with_status(CommandStatus::Success, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::with_status(CommandStatus::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(CommandStatus::NotFound, message)
    }

    fn with_status(status: CommandStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            output: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("association store: {0}")]
    Persistence(#[from] StateError),

    #[error("cluster topology: {0}")]
    Topology(#[from] ClusterError),
}

pub type AdminResult<T> = Result<T, AdminError>;

/// Typed rows of a listing plus their text rendering.
#[derive(Debug, Clone, Serialize)]
pub struct Listing<R> {
    pub rows: Vec<R>,
    pub table: String,
}

impl<R> Listing<R> {
    pub fn into_result(self) -> CommandResult {
        CommandResult {
            status: CommandStatus::Success,
            message: format!("{} entries", self.rows.len()),
            output: self.table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolRuleRow {
    pub pool: String,
    pub rule: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationRow {
    pub rule: String,
    pub point: GeoPoint,
    pub proximity_miles: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideRow {
    pub point: GeoPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Administrative operations. Cheap to clone; clones share one write lock.
#[derive(Clone)]
pub struct AdminService {
    store: AssociationStore,
    topology: Arc<dyn ClusterTopology>,
    geocoder: Arc<dyn Geocoder>,
    default_proximity_miles: f64,
    writes: Arc<Mutex<()>>,
}

impl AdminService {
    pub fn new(
        store: AssociationStore,
        topology: Arc<dyn ClusterTopology>,
        geocoder: Arc<dyn Geocoder>,
        default_proximity_miles: f64,
    ) -> Self {
        Self {
            store,
            topology,
            geocoder,
            default_proximity_miles,
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &AssociationStore {
        &self.store
    }

    // ── Pool ↔ rule ────────────────────────────────────────────────

    pub fn add_pool_rule(&self, rule: &str, pool: &str) -> AdminResult<CommandResult> {
        let _guard = self.lock();
        if self.store.pool_associations()?.contains(pool, rule) {
            return Ok(CommandResult::success(format!(
                "Association of {pool} with crush rule {rule} already set"
            )));
        }
        if !self.topology.has_pool(pool)? || !self.topology.has_rule(rule)? {
            return Ok(CommandResult::invalid("Pool or crush rule does not exist"));
        }
        self.store
            .update(|p: &mut PoolAssociations| p.insert(pool, rule))?;
        info!(%pool, %rule, "pool associated with placement rule");
        Ok(CommandResult::success(format!(
            "Associated {pool} with crush rule {rule} for cache overlays"
        )))
    }

    pub fn remove_pool_rule(&self, rule: &str, pool: &str) -> AdminResult<CommandResult> {
        let _guard = self.lock();
        let removed = self
            .store
            .update(|p: &mut PoolAssociations| p.remove(pool, rule))?;
        if !removed {
            return Ok(CommandResult::not_found(format!(
                "Association of {pool} with crush rule {rule} not found"
            )));
        }
        info!(%pool, %rule, "pool association removed");
        Ok(CommandResult::success(format!(
            "Removed association of {pool} with crush rule {rule}"
        )))
    }

    // ── Location ↔ rule ────────────────────────────────────────────

    /// Register a location for `rule`, or update the radius of an
    /// already registered coordinate.
    pub fn add_location(
        &self,
        rule: &str,
        location: &str,
        proximity_miles: Option<f64>,
    ) -> AdminResult<CommandResult> {
        let miles = proximity_miles.unwrap_or(self.default_proximity_miles);
        if !miles.is_finite() || miles < 0.0 {
            return Ok(CommandResult::invalid(format!(
                "Proximity {miles} must be a non-negative number of miles"
            )));
        }
        let Some(found) = self.geocoder.geocode(location) else {
            return Ok(lookup_failed(location));
        };
        let point = found.point;

        let _guard = self.lock();
        let existing = self.store.location_associations()?;
        if existing.find(rule, point).is_none() && !self.topology.has_rule(rule)? {
            return Ok(CommandResult::invalid(format!("Crush rule {rule} not found")));
        }

        let outcome = self
            .store
            .update(|l: &mut LocationAssociations| l.upsert(rule, point, miles))?;
        Ok(match outcome {
            LocationUpsert::Unchanged => CommandResult::success(format!(
                "Location {point} with proximity {miles} miles already associated with crush rule {rule}"
            )),
            LocationUpsert::Updated { previous_miles } => {
                info!(%rule, %point, previous_miles, proximity_miles = miles, "location radius updated");
                CommandResult::success(format!(
                    "Location already associated - updated location proximity to {miles} miles"
                ))
            }
            LocationUpsert::Added => {
                info!(%rule, %point, proximity_miles = miles, "location associated");
                CommandResult::success(format!(
                    "Associated {} ({point}) with crush rule {rule} within {miles} miles",
                    found.display
                ))
            }
        })
    }

    pub fn remove_location(&self, rule: &str, location: &str) -> AdminResult<CommandResult> {
        let Some(found) = self.geocoder.geocode(location) else {
            return Ok(lookup_failed(location));
        };
        let point = found.point;

        let _guard = self.lock();
        let removed = self
            .store
            .update(|l: &mut LocationAssociations| l.remove(rule, point))?;
        if !removed {
            return Ok(CommandResult::not_found(format!(
                "Location {point} not associated with crush rule {rule}"
            )));
        }
        info!(%rule, %point, "location association removed");
        Ok(CommandResult::success(format!(
            "Removed location {point} from crush rule {rule}"
        )))
    }

    // ── Enable flags ───────────────────────────────────────────────

    /// Allow or stop automatic cache creation for `rule`. The rule must
    /// have at least one registered location.
    pub fn set_enabled(&self, rule: &str, enable: bool) -> AdminResult<CommandResult> {
        let _guard = self.lock();
        if !self.store.location_associations()?.has_rule(rule) {
            return Ok(CommandResult::not_found(format!("Crush rule {rule} not found")));
        }
        self.store
            .update(|e: &mut EnableFlags| e.set(rule, enable))?;
        info!(%rule, enable, "auto-provisioning toggled");
        let verb = if enable { "Enabled" } else { "Disabled" };
        Ok(CommandResult::success(format!(
            "{verb} cache creation for crush rule {rule}"
        )))
    }

    // ── Simulated traffic ──────────────────────────────────────────

    pub fn simulate_location(&self, location: &str) -> AdminResult<CommandResult> {
        let Some(found) = self.geocoder.geocode(location) else {
            return Ok(lookup_failed(location));
        };

        let _guard = self.lock();
        let added = self
            .store
            .update(|o: &mut OverrideLocations| o.add(found.point))?;
        if !added {
            return Ok(CommandResult::success(format!(
                "Already simulating high traffic for {}",
                describe(&found)
            )));
        }
        info!(point = %found.point, "simulating traffic");
        Ok(CommandResult::success(format!(
            "Simulating high traffic threshold for {}",
            describe(&found)
        )))
    }

    pub fn stop_simulating(&self, location: &str) -> AdminResult<CommandResult> {
        let Some(found) = self.geocoder.geocode(location) else {
            return Ok(lookup_failed(location));
        };

        let _guard = self.lock();
        let removed = self
            .store
            .update(|o: &mut OverrideLocations| o.remove(found.point))?;
        if !removed {
            return Ok(CommandResult::not_found(
                "Location not found in simulated locations",
            ));
        }
        info!(point = %found.point, "stopped simulating traffic");
        Ok(CommandResult::success(format!(
            "Stopped simulating traffic for {}",
            describe(&found)
        )))
    }

    // ── Listings ───────────────────────────────────────────────────

    pub fn list_pool_rules(&self) -> AdminResult<Listing<PoolRuleRow>> {
        let pools = self.store.pool_associations()?;
        let rows: Vec<PoolRuleRow> = pools
            .pairs()
            .map(|(pool, rule)| PoolRuleRow {
                pool: pool.to_string(),
                rule: rule.to_string(),
            })
            .collect();

        let mut table = Table::new(&["Pool", "Crush Rule"]);
        for r in &rows {
            table.row(vec![r.pool.clone(), r.rule.clone()]);
        }
        Ok(Listing {
            table: table.render(),
            rows,
        })
    }

    pub fn list_locations(&self) -> AdminResult<Listing<LocationRow>> {
        let locations = self.store.location_associations()?;
        let rows: Vec<LocationRow> = locations
            .rules
            .iter()
            .flat_map(|(rule, locs)| {
                locs.iter().map(move |l| (rule.clone(), l.point, l.proximity_miles))
            })
            .map(|(rule, point, proximity_miles)| LocationRow {
                rule,
                point,
                proximity_miles,
                description: self.geocoder.reverse(point),
            })
            .collect();

        let mut table = Table::new(&["Crush Rule", "Lat/Lon", "Proximity (mi)", "Location"]);
        for r in &rows {
            table.row_wrapped(
                vec![
                    r.rule.clone(),
                    r.point.to_string(),
                    r.proximity_miles.to_string(),
                    r.description.clone().unwrap_or_default(),
                ],
                3,
            );
        }
        Ok(Listing {
            table: table.render(),
            rows,
        })
    }

    pub fn list_overrides(&self) -> AdminResult<Listing<OverrideRow>> {
        let overrides = self.store.override_locations()?;
        let rows: Vec<OverrideRow> = overrides
            .points
            .iter()
            .map(|p| OverrideRow {
                point: *p,
                description: self.geocoder.reverse(*p),
            })
            .collect();

        let mut table = Table::new(&["Lat/Lon", "Location"]);
        for r in &rows {
            table.row_wrapped(
                vec![r.point.to_string(), r.description.clone().unwrap_or_default()],
                1,
            );
        }
        Ok(Listing {
            table: table.render(),
            rows,
        })
    }

    pub fn list_tiers(&self) -> AdminResult<Listing<CacheTierRecord>> {
        let rows = self.store.tier_status()?.records;

        let mut table = Table::new(&["Crush Rule", "Pool", "Cache Pool", "State", "Since"]);
        for r in &rows {
            table.row(vec![
                r.placement_rule.clone(),
                r.backing_pool.clone(),
                r.cache_pool.clone(),
                r.state.to_string(),
                r.last_transition_time.to_string(),
            ]);
        }
        Ok(Listing {
            table: table.render(),
            rows,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn lookup_failed(location: &str) -> CommandResult {
    CommandResult::invalid(format!("Location {location} not found by geocode lookup"))
}

fn describe(found: &GeocodedLocation) -> String {
    let coords = found.point.to_string();
    if found.display == coords {
        coords
    } else {
        format!("{} ({coords})", found.display)
    }
}
