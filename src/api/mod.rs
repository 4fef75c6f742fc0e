//! HTTP API endpoints.

pub mod health;
pub mod intents;
pub mod memories;
pub mod portfolio;

use axum::Router;

use crate::AppState;

/// Create the main API router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(intents::router())
        .merge(memories::router())
        .merge(portfolio::router())
}
