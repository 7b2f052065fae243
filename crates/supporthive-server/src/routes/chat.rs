use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use supporthive_schema::{ChatRequest, ChatResponse};

use super::{detail, ApiError};
use crate::state::AppState;

pub const MAX_QUERY_CHARS: usize = 1000;

pub fn router() -> Router<AppState> {
    Router::new().route("/chat/", post(chat))
}

pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) =
        body.map_err(|rejection| detail(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text()))?;
    validate_query(&request.query)?;

    Ok(Json(state.agent.generate_response(request).await))
}

/// Blank is judged on the trimmed text, length on the raw text.
fn validate_query(query: &str) -> Result<(), ApiError> {
    if query.trim().is_empty() {
        return Err(detail(
            StatusCode::UNPROCESSABLE_ENTITY,
            "query must not be empty",
        ));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(detail(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("query must be at most {MAX_QUERY_CHARS} characters"),
        ));
    }
    Ok(())
}
