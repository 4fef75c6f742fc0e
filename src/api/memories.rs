//! Memory ingestion and retrieval endpoints.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::domain::{MemoryKind, MemoryLayer, Message};
use crate::error::EngineError;
use crate::memory::{RetrievalPage, RetrievalRequest};
use crate::AppState;

/// Create the memories router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/store", post(store_transcript))
        .route("/v1/retrieve", get(retrieve_memories))
}

#[derive(Debug, Deserialize)]
struct StoreRequest {
    user_id: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct StoreResponse {
    stored: usize,
}

async fn store_transcript(
    State(state): State<AppState>,
    Json(request): Json<StoreRequest>,
) -> Result<Json<StoreResponse>, EngineError> {
    let stored = state
        .memory
        .store_transcript(&request.user_id, &request.messages)
        .await?;
    Ok(Json(StoreResponse { stored }))
}

#[derive(Debug, Deserialize)]
struct RetrieveQuery {
    user_id: String,
    query: String,
    layer: Option<MemoryLayer>,
    #[serde(rename = "type")]
    kind: Option<MemoryKind>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn retrieve_memories(
    State(state): State<AppState>,
    Query(query): Query<RetrieveQuery>,
) -> Result<Json<RetrievalPage>, EngineError> {
    let memory_config = &state.config.memory;
    let limit = query
        .limit
        .unwrap_or(memory_config.retrieval_default_limit)
        .clamp(1, memory_config.retrieval_max_limit);

    let page = state
        .memory
        .retrieve(&RetrievalRequest {
            user_id: query.user_id,
            query: query.query,
            layer: query.layer,
            kind: query.kind,
            limit,
            offset: query.offset.unwrap_or(0),
        })
        .await?;
    Ok(Json(page))
}
