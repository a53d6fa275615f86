//! Collaborator interfaces consumed by the control loop and admin surface.
//!
//! All calls are synchronous and may block; callers run them off the
//! async executor.

use geotier_core::GeoPoint;

use crate::command::{ClusterCommand, CommandOutput};
use crate::error::ClusterResult;

/// Executes administrative commands. `Err` means the command could not be
/// issued at all; a command that ran and failed is an `Ok` with a non-zero
/// status.
pub trait ClusterControl: Send + Sync {
    fn execute(&self, command: &ClusterCommand) -> ClusterResult<CommandOutput>;
}

/// Names that exist in the cluster, used to validate operator input.
pub trait ClusterTopology: Send + Sync {
    fn pools(&self) -> ClusterResult<Vec<String>>;
    fn placement_rules(&self) -> ClusterResult<Vec<String>>;

    fn has_pool(&self, name: &str) -> ClusterResult<bool> {
        Ok(self.pools()?.iter().any(|p| p == name))
    }

    fn has_rule(&self, name: &str) -> ClusterResult<bool> {
        Ok(self.placement_rules()?.iter().any(|r| r == name))
    }
}

/// Object-level access to a pool's contents.
pub trait StorageContent: Send + Sync {
    /// Object names currently stored in `pool`.
    fn list_objects(&self, pool: &str) -> ClusterResult<Vec<String>>;
    /// Flush dirty objects to the backing pool and evict everything.
    /// Blocks until done.
    fn flush_evict_all(&self, pool: &str) -> ClusterResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedLocation {
    pub point: GeoPoint,
    pub display: String,
}

pub trait Geocoder: Send + Sync {
    /// Resolve free text to a coordinate, or `None` when nothing matches.
    fn geocode(&self, query: &str) -> Option<GeocodedLocation>;
    /// A human-readable description of a coordinate, when one is known.
    fn reverse(&self, point: GeoPoint) -> Option<String>;
}
