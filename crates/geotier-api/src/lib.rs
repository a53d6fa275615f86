//! geotier-api — operator commands and REST API for geotier.
//!
//! [`AdminService`] validates and applies association changes and renders
//! listings as fixed-width text tables. The axum router exposes it over
//! HTTP alongside a Prometheus view of the tier status table.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/associations` | List pool ↔ rule associations |
//! | POST | `/api/v1/associations` | Associate a pool with a placement rule |
//! | DELETE | `/api/v1/associations` | Remove an association |
//! | GET | `/api/v1/locations` | List registered locations |
//! | POST | `/api/v1/locations` | Register a location or update its radius |
//! | DELETE | `/api/v1/locations` | Remove a registered location |
//! | POST | `/api/v1/rules/:rule/enable` | Enable/disable auto-provisioning |
//! | GET | `/api/v1/simulated` | List simulated hot locations |
//! | POST | `/api/v1/simulated` | Start simulating a location |
//! | DELETE | `/api/v1/simulated` | Stop simulating a location |
//! | GET | `/api/v1/tiers` | List cache tier records |
//! | POST | `/api/v1/traffic` | Report per-location traffic samples |
//! | GET | `/metrics` | Prometheus exposition |
//!
//! List routes return the text table with `?format=table`.

pub mod admin;
pub mod handlers;
pub mod metrics;
pub mod render;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use geotier_trigger::SampledTraffic;

pub use admin::{
    AdminError, AdminResult, AdminService, CommandResult, CommandStatus, Listing, LocationRow,
    OverrideRow, PoolRuleRow,
};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub admin: Arc<AdminService>,
    /// Sink for reported samples; the control loop reads the same handle.
    pub traffic: SampledTraffic,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/associations",
            get(handlers::list_associations)
                .post(handlers::add_association)
                .delete(handlers::remove_association),
        )
        .route(
            "/locations",
            get(handlers::list_locations)
                .post(handlers::add_location)
                .delete(handlers::remove_location),
        )
        .route("/rules/{rule}/enable", post(handlers::set_enabled))
        .route(
            "/simulated",
            get(handlers::list_simulated)
                .post(handlers::start_simulating)
                .delete(handlers::stop_simulating),
        )
        .route("/tiers", get(handlers::list_tiers))
        .route("/traffic", post(handlers::report_traffic))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
