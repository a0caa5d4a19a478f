// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
//   GET /health        liveness probe
//   GET /trend/update  recompute all tracked assets and store one row
//   GET /trend/check   latest stored scores and their timestamp
//
// Failures are reported as `{"error": "..."}` with a non-2xx status.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::trend::TrendService;

/// Shared state of the HTTP surface.
pub struct ApiState {
    pub trends: TrendService,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.to_string() })))
}

// =============================================================================
// Router construction
// =============================================================================

/// Build the router with CORS middleware and shared state.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/trend/update", get(update_trends))
        .route("/trend/check", get(check_trends))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        server_time: Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Trend
// =============================================================================

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn update_trends(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    match state.trends.update_trends().await {
        Ok(row) => {
            info!(timestamp = %row.timestamp, "trend update requested via API");
            Ok(Json(StatusResponse { status: "ok" }))
        }
        Err(e) => {
            let message = format!("{e:#}");
            error!(error = %message, "trend update failed");
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, message))
        }
    }
}

#[derive(Serialize)]
struct TrendResponse {
    timestamp: DateTime<Utc>,
    trend: BTreeMap<String, f64>,
}

async fn check_trends(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<TrendResponse>, ApiError> {
    match state.trends.latest().await {
        Ok(Some(row)) => Ok(Json(TrendResponse {
            timestamp: row.timestamp,
            trend: row.trends,
        })),
        Ok(None) => Err(error_response(StatusCode::NOT_FOUND, "no trend data stored yet")),
        Err(e) => {
            let message = format!("{e:#}");
            error!(error = %message, "reading latest trend failed");
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, message))
        }
    }
}
