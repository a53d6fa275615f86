//! Typed, versioned collections over a [`KvStore`].
//!
//! Each collection is read whole, mutated in memory by the caller, and
//! written back whole. Values are wrapped in an envelope carrying the
//! schema version and the collection tag; both are checked on load.

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::kv::{KvStore, RedbKv};
use crate::types::*;

/// Version written into every envelope. Bump on incompatible changes.
pub const SCHEMA_VERSION: u32 = 1;

/// A persisted collection type.
pub trait Collection: Serialize + DeserializeOwned + Default {
    /// Storage key, also used as the envelope's table tag.
    const KEY: &'static str;

    /// Check invariants that serde alone cannot express.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Collection for PoolAssociations {
    const KEY: &'static str = "pool_associations";
}

impl Collection for LocationAssociations {
    const KEY: &'static str = "location_associations";

    fn validate(&self) -> Result<(), String> {
        self.check_invariants()
    }
}

impl Collection for EnableFlags {
    const KEY: &'static str = "enable_flags";
}

impl Collection for OverrideLocations {
    const KEY: &'static str = "override_locations";

    fn validate(&self) -> Result<(), String> {
        self.check_invariants()
    }
}

impl Collection for TierStatusTable {
    const KEY: &'static str = "tier_status";

    fn validate(&self) -> Result<(), String> {
        self.check_invariants()
    }
}

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    version: u32,
    table: &'a str,
    data: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    version: u32,
    table: String,
    data: serde_json::Value,
}

/// Everything the control loop reads in one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssociationSnapshot {
    pub pools: PoolAssociations,
    pub locations: LocationAssociations,
    pub enabled: EnableFlags,
    pub overrides: OverrideLocations,
    pub tiers: TierStatusTable,
}

/// Thread-safe association store. Cheap to clone.
#[derive(Clone)]
pub struct AssociationStore {
    kv: Arc<dyn KvStore>,
}

impl AssociationStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        Ok(Self::with_backend(Arc::new(RedbKv::open(path)?)))
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        Ok(Self::with_backend(Arc::new(RedbKv::open_in_memory()?)))
    }

    /// Wrap any key-value backend.
    pub fn with_backend(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Load a collection. A missing key yields the empty collection; an
    /// unreadable or mismatched value is an error.
    pub fn load<T: Collection>(&self) -> StateResult<T> {
        let Some(bytes) = self.kv.get(T::KEY)? else {
            debug!(key = T::KEY, "collection absent, using empty default");
            return Ok(T::default());
        };
        decode(&bytes)
    }

    /// Write a collection back in full.
    pub fn save<T: Collection>(&self, value: &T) -> StateResult<()> {
        let envelope = EnvelopeOut {
            version: SCHEMA_VERSION,
            table: T::KEY,
            data: value,
        };
        let bytes =
            serde_json::to_vec(&envelope).map_err(|e| StateError::Serialize(e.to_string()))?;
        self.kv.put(T::KEY, &bytes)
    }

    /// Read-modify-write helper. The closure's return value is passed back
    /// after the collection has been written.
    pub fn update<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> StateResult<R>
    where
        T: Collection,
    {
        let mut value: T = self.load()?;
        let out = f(&mut value);
        self.save(&value)?;
        Ok(out)
    }

    /// Load every collection the control loop needs.
    pub fn snapshot(&self) -> StateResult<AssociationSnapshot> {
        Ok(AssociationSnapshot {
            pools: self.load()?,
            locations: self.load()?,
            enabled: self.load()?,
            overrides: self.load()?,
            tiers: self.load()?,
        })
    }

    pub fn pool_associations(&self) -> StateResult<PoolAssociations> {
        self.load()
    }

    pub fn location_associations(&self) -> StateResult<LocationAssociations> {
        self.load()
    }

    pub fn enable_flags(&self) -> StateResult<EnableFlags> {
        self.load()
    }

    pub fn override_locations(&self) -> StateResult<OverrideLocations> {
        self.load()
    }

    pub fn tier_status(&self) -> StateResult<TierStatusTable> {
        self.load()
    }
}

fn decode<T: Collection>(bytes: &[u8]) -> StateResult<T> {
    let deser = |detail: String| StateError::Deserialize {
        key: T::KEY.to_string(),
        detail,
    };
    let mismatch = |detail: String| StateError::SchemaMismatch {
        key: T::KEY.to_string(),
        detail,
    };

    let envelope: EnvelopeIn = serde_json::from_slice(bytes).map_err(|e| deser(e.to_string()))?;
    if envelope.version != SCHEMA_VERSION {
        return Err(mismatch(format!(
            "stored version {} but this build reads version {}",
            envelope.version, SCHEMA_VERSION
        )));
    }
    if envelope.table != T::KEY {
        return Err(mismatch(format!("envelope tagged {:?}", envelope.table)));
    }
    let value: T = serde_json::from_value(envelope.data).map_err(|e| deser(e.to_string()))?;
    if let Err(detail) = value.validate() {
        warn!(key = T::KEY, %detail, "stored collection failed validation");
        return Err(mismatch(detail));
    }
    Ok(value)
}
