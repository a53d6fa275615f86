pub mod config;
pub mod geo;
pub mod types;

pub use config::GeotierConfig;
pub use geo::distance_miles;
pub use types::*;
