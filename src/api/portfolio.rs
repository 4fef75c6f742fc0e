//! Portfolio holdings endpoints.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::domain::{Holding, HoldingDraft, OwnershipIntent};
use crate::error::EngineError;
use crate::portfolio::PortfolioView;
use crate::AppState;

/// Create the portfolio router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/portfolio", get(get_portfolio))
        .route("/v1/portfolio/holding", post(upsert_holding))
}

#[derive(Debug, Deserialize)]
struct PortfolioQuery {
    user_id: String,
    intent: Option<OwnershipIntent>,
}

async fn get_portfolio(
    State(state): State<AppState>,
    Query(query): Query<PortfolioQuery>,
) -> Result<Json<PortfolioView>, EngineError> {
    let view = state
        .portfolio
        .portfolio(&query.user_id, query.intent)
        .await?;
    Ok(Json(view))
}

#[derive(Debug, Serialize)]
struct UpsertResponse {
    created: bool,
    #[serde(flatten)]
    holding: Holding,
}

/// 201 when the upsert created a new holding, 200 when it merged into an
/// existing one.
async fn upsert_holding(
    State(state): State<AppState>,
    Json(draft): Json<HoldingDraft>,
) -> Result<(StatusCode, Json<UpsertResponse>), EngineError> {
    let (holding, created) = state.portfolio.upsert(draft).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(UpsertResponse { created, holding })))
}
