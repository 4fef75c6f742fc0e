//! Scheduled intent endpoints.
//!
//! CRUD over intents plus the two poller-facing operations: the pending
//! queue and fire recording.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::{IntentFilter, IntentRepository};
use crate::domain::{
    FireReport, FireResult, IntentDraft, IntentExecution, ScheduledIntent, TriggerType,
};
use crate::error::EngineError;
use crate::scheduler::IntentUpdate;
use crate::AppState;

/// Create the intents router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/intents", post(create_intent).get(list_intents))
        .route("/v1/intents/pending", get(list_pending))
        .route(
            "/v1/intents/{id}",
            get(get_intent).put(update_intent).delete(delete_intent),
        )
        .route("/v1/intents/{id}/fire", post(fire_intent))
        .route("/v1/intents/{id}/history", get(intent_history))
}

async fn create_intent(
    State(state): State<AppState>,
    Json(draft): Json<IntentDraft>,
) -> Result<(StatusCode, Json<ScheduledIntent>), EngineError> {
    let intent = state.engine.create(draft).await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    user_id: Option<String>,
    trigger_type: Option<TriggerType>,
    enabled: Option<bool>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    intents: Vec<ScheduledIntent>,
    limit: usize,
    offset: usize,
}

async fn list_intents(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, EngineError> {
    let defaults = IntentFilter::default();
    let filter = IntentFilter {
        user_id: query.user_id,
        trigger_type: query.trigger_type,
        enabled: query.enabled,
        limit: query.limit.unwrap_or(defaults.limit),
        offset: query.offset.unwrap_or(defaults.offset),
    };
    let intents = state.db.list_intents(&filter).await?;
    Ok(Json(ListResponse {
        intents,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct PendingQuery {
    user_id: Option<String>,
}

async fn list_pending(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<ScheduledIntent>>, EngineError> {
    let mut due = state
        .db
        .list_pending(Utc::now(), query.user_id.as_deref())
        .await?;
    due.truncate(state.config.scheduler.pending_batch_size);
    Ok(Json(due))
}

async fn get_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScheduledIntent>, EngineError> {
    let intent = state
        .db
        .get_intent(id)
        .await?
        .ok_or(EngineError::NotFound)?;
    Ok(Json(intent))
}

async fn update_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<IntentUpdate>,
) -> Result<Json<ScheduledIntent>, EngineError> {
    let intent = state.engine.update(id, update).await?;
    Ok(Json(intent))
}

async fn delete_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, EngineError> {
    if !state.db.delete_intent(id).await? {
        return Err(EngineError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn fire_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(report): Json<FireReport>,
) -> Result<Json<FireResult>, EngineError> {
    let result = state.engine.fire(id, report).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    executions: Vec<IntentExecution>,
    limit: usize,
    offset: usize,
}

async fn intent_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, EngineError> {
    // History of a deleted or unknown intent is a 404, not an empty page.
    state
        .db
        .get_intent(id)
        .await?
        .ok_or(EngineError::NotFound)?;

    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);
    let executions = state.db.list_executions(id, limit, offset).await?;
    Ok(Json(HistoryResponse {
        executions,
        limit,
        offset,
    }))
}
