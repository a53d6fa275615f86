//! redb table definitions for the geotier association store.
//!
//! One table with `&str` keys (collection names) and `&[u8]` values
//! (JSON envelopes).

use redb::TableDefinition;

/// Every logical collection, keyed by its name.
pub const COLLECTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("geotier");
