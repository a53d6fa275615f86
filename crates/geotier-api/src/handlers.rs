//! REST API handlers.
//!
//! Commands run on the blocking pool since topology checks may shell out
//! to the cluster CLI. Command results map to 200 / 400 / 404; store or
//! topology failures to 500.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use geotier_trigger::TrafficSample;

use crate::ApiState;
use crate::admin::{AdminResult, AdminService, CommandResult, CommandStatus, Listing};

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn command_response(result: CommandResult) -> Response {
    let status = match result.status {
        CommandStatus::Success => return ApiResponse::ok(result).into_response(),
        CommandStatus::InvalidArgument => StatusCode::BAD_REQUEST,
        CommandStatus::NotFound => StatusCode::NOT_FOUND,
    };
    let error = Some(result.message.clone());
    (
        status,
        Json(ApiResponse {
            success: false,
            data: Some(result),
            error,
        }),
    )
        .into_response()
}

async fn run_command<F>(state: &ApiState, f: F) -> Response
where
    F: FnOnce(&AdminService) -> AdminResult<CommandResult> + Send + 'static,
{
    let admin = state.admin.clone();
    match tokio::task::spawn_blocking(move || f(&admin)).await {
        Ok(Ok(result)) => command_response(result),
        Ok(Err(e)) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
        Err(e) => error_response(
            &format!("command task failed: {e}"),
            StatusCode::INTERNAL_SERVER_ERROR,
        )
        .into_response(),
    }
}

/// `?format=table` selects the rendered text table over JSON rows.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub format: Option<String>,
}

impl ListQuery {
    fn wants_table(&self) -> bool {
        self.format.as_deref() == Some("table")
    }
}

async fn run_listing<R, F>(state: &ApiState, query: ListQuery, f: F) -> Response
where
    R: Serialize + Send + 'static,
    F: FnOnce(&AdminService) -> AdminResult<Listing<R>> + Send + 'static,
{
    let admin = state.admin.clone();
    match tokio::task::spawn_blocking(move || f(&admin)).await {
        Ok(Ok(listing)) if query.wants_table() => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            listing.table,
        )
            .into_response(),
        Ok(Ok(listing)) => ApiResponse::ok(listing.rows).into_response(),
        Ok(Err(e)) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
        Err(e) => error_response(
            &format!("listing task failed: {e}"),
            StatusCode::INTERNAL_SERVER_ERROR,
        )
        .into_response(),
    }
}

// ── Pool associations ──────────────────────────────────────────

/// Pool ↔ rule request body.
#[derive(Debug, Clone, Deserialize)]
pub struct AssociationRequest {
    pub rule: String,
    pub pool: String,
}

/// GET /api/v1/associations
pub async fn list_associations(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    run_listing(&state, query, |admin| admin.list_pool_rules()).await
}

/// POST /api/v1/associations
pub async fn add_association(
    State(state): State<ApiState>,
    Json(req): Json<AssociationRequest>,
) -> impl IntoResponse {
    run_command(&state, move |admin| admin.add_pool_rule(&req.rule, &req.pool)).await
}

/// DELETE /api/v1/associations
pub async fn remove_association(
    State(state): State<ApiState>,
    Json(req): Json<AssociationRequest>,
) -> impl IntoResponse {
    run_command(&state, move |admin| admin.remove_pool_rule(&req.rule, &req.pool)).await
}

// ── Locations ──────────────────────────────────────────────────

/// Location ↔ rule request body. `location` is `"lat,lon"` or a place name.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationRequest {
    pub rule: String,
    pub location: String,
    #[serde(default)]
    pub proximity_miles: Option<f64>,
}

/// GET /api/v1/locations
pub async fn list_locations(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    run_listing(&state, query, |admin| admin.list_locations()).await
}

/// POST /api/v1/locations
pub async fn add_location(
    State(state): State<ApiState>,
    Json(req): Json<LocationRequest>,
) -> impl IntoResponse {
    run_command(&state, move |admin| {
        admin.add_location(&req.rule, &req.location, req.proximity_miles)
    })
    .await
}

/// DELETE /api/v1/locations
pub async fn remove_location(
    State(state): State<ApiState>,
    Json(req): Json<LocationRequest>,
) -> impl IntoResponse {
    run_command(&state, move |admin| admin.remove_location(&req.rule, &req.location)).await
}

// ── Enable flags ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct EnableRequest {
    pub enable: bool,
}

/// POST /api/v1/rules/:rule/enable
pub async fn set_enabled(
    State(state): State<ApiState>,
    Path(rule): Path<String>,
    Json(req): Json<EnableRequest>,
) -> impl IntoResponse {
    run_command(&state, move |admin| admin.set_enabled(&rule, req.enable)).await
}

// ── Simulated traffic ──────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SimulateRequest {
    pub location: String,
}

/// GET /api/v1/simulated
pub async fn list_simulated(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    run_listing(&state, query, |admin| admin.list_overrides()).await
}

/// POST /api/v1/simulated
pub async fn start_simulating(
    State(state): State<ApiState>,
    Json(req): Json<SimulateRequest>,
) -> impl IntoResponse {
    run_command(&state, move |admin| admin.simulate_location(&req.location)).await
}

/// DELETE /api/v1/simulated
pub async fn stop_simulating(
    State(state): State<ApiState>,
    Json(req): Json<SimulateRequest>,
) -> impl IntoResponse {
    run_command(&state, move |admin| admin.stop_simulating(&req.location)).await
}

// ── Tiers ──────────────────────────────────────────────────────

/// GET /api/v1/tiers
pub async fn list_tiers(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    run_listing(&state, query, |admin| admin.list_tiers()).await
}

// ── Traffic samples ────────────────────────────────────────────

/// POST /api/v1/traffic
///
/// Replaces the previously reported samples.
pub async fn report_traffic(
    State(state): State<ApiState>,
    Json(samples): Json<Vec<TrafficSample>>,
) -> impl IntoResponse {
    if let Some(bad) = samples.iter().find(|s| !s.point.is_valid()) {
        return error_response(
            &format!("invalid coordinate {}", bad.point),
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }
    let count = samples.len();
    state.traffic.report(samples);
    ApiResponse::ok(serde_json::json!({ "samples": count })).into_response()
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    match state.admin.store().tier_status() {
        Ok(tiers) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            crate::metrics::render_prometheus(&tiers),
        )
            .into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}
