//! Health check endpoints.

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::database::Database;
use crate::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check response.
#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    database: &'static str,
}

/// Readiness check.
async fn readiness_check(State(state): State<AppState>) -> Json<ReadinessResponse> {
    let database = match state.db {
        Database::SQLite(_) => "sqlite",
        Database::InMemory(_) => "in-memory",
    };
    Json(ReadinessResponse {
        status: "ready",
        database,
    })
}
