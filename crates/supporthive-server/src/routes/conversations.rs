use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use supporthive_core::SessionStats;
use supporthive_schema::ConversationTurn;

use super::{internal, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct ConversationHistory {
    pub session_id: String,
    pub messages: Vec<ConversationTurn>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub session_id: String,
    pub cleared: bool,
}

#[derive(Serialize)]
pub struct ConversationStats {
    pub session_id: String,
    #[serde(flatten)]
    pub stats: SessionStats,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/conversations/{session_id}/",
            get(get_history).delete(clear_history),
        )
        .route("/conversations/{session_id}/stats/", get(history_stats))
}

/// Unknown sessions read as empty rather than 404.
pub async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ConversationHistory>, ApiError> {
    let messages = state
        .agent
        .history(&session_id, params.limit)
        .await
        .map_err(internal)?;
    Ok(Json(ConversationHistory {
        session_id,
        total: messages.len(),
        messages,
    }))
}

pub async fn clear_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    let cleared = state
        .agent
        .clear_conversation(&session_id)
        .await
        .map_err(internal)?;
    Ok(Json(ClearResponse {
        session_id,
        cleared,
    }))
}

pub async fn history_stats(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ConversationStats>, ApiError> {
    let stats = state
        .agent
        .conversation_stats(&session_id)
        .await
        .map_err(internal)?;
    Ok(Json(ConversationStats { session_id, stats }))
}
