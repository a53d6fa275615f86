//! geotier-state — durable association store for geotier.
//!
//! Backed by [redb](https://docs.rs/redb) through the [`KvStore`] trait,
//! holds the pool↔rule and rule↔location associations, per-rule enable
//! flags, simulated override locations, and the cache tier status records.
//!
//! # Architecture
//!
//! Each logical collection is a single key in one redb table. Values are
//! JSON envelopes carrying a schema version and the collection's tag:
//!
//! ```text
//! pool_associations     → {"version":1,"table":"pool_associations","data":{...}}
//! location_associations → ...
//! enable_flags          → ...
//! override_locations    → ...
//! tier_status           → ...
//! ```
//!
//! A whole collection is read, mutated in memory and written back. A missing
//! key reads as the empty collection; anything present but unreadable is an
//! error, never a reset.

pub mod error;
pub mod kv;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use kv::{KvStore, RedbKv};
pub use store::{AssociationSnapshot, AssociationStore, Collection, SCHEMA_VERSION};
pub use types::*;
