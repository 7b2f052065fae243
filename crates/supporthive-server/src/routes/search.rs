use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use supporthive_schema::{KnowledgeHit, WebResult};

use super::{detail, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse<T> {
    pub query: String,
    pub results: Vec<T>,
    pub total: usize,
}

impl<T> SearchResponse<T> {
    fn new(query: String, results: Vec<T>) -> Self {
        Self {
            total: results.len(),
            query,
            results,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search/knowledge/", get(search_knowledge))
        .route("/search/web/", get(search_web))
}

fn parse_params(state: &AppState, params: SearchParams) -> Result<(String, usize), ApiError> {
    let query = params
        .query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| detail(StatusCode::UNPROCESSABLE_ENTITY, "query is required"))?;
    let limit = params
        .limit
        .unwrap_or(state.config.search.max_results)
        .max(1);
    Ok((query, limit))
}

pub async fn search_knowledge(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse<KnowledgeHit>>, ApiError> {
    let (query, limit) = parse_params(&state, params)?;
    let results = state.loader.search(&query, limit).await;
    Ok(Json(SearchResponse::new(query, results)))
}

pub async fn search_web(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse<WebResult>>, ApiError> {
    let (query, limit) = parse_params(&state, params)?;
    let results = state.search.search_with_fallback(&query, limit).await;
    Ok(Json(SearchResponse::new(query, results)))
}
