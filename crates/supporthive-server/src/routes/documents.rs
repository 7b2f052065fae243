use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use supporthive_knowledge::LoaderStatistics;
use supporthive_schema::{BatchResult, Document, DocumentPatch, NewDocument, OperationResult};

use super::{detail, internal, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchUpload {
    pub documents: Vec<NewDocument>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/documents/upload/", post(upload_document))
        .route("/documents/batch/", post(upload_batch))
        .route("/documents/stats/", get(document_stats))
        .route(
            "/documents/{id}/",
            get(get_document).put(update_document).delete(delete_document),
        )
}

fn unprocessable(rejection: JsonRejection) -> ApiError {
    detail(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
}

fn not_found(id: &str) -> ApiError {
    detail(StatusCode::NOT_FOUND, format!("Document {id} not found"))
}

/// A rejected upload answers 400 with the same result body.
fn into_reply(result: OperationResult) -> (StatusCode, Json<OperationResult>) {
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(result))
}

pub async fn upload_document(
    State(state): State<AppState>,
    body: Result<Json<NewDocument>, JsonRejection>,
) -> Result<(StatusCode, Json<OperationResult>), ApiError> {
    let Json(document) = body.map_err(unprocessable)?;
    Ok(into_reply(state.loader.add_document(document).await))
}

pub async fn upload_batch(
    State(state): State<AppState>,
    body: Result<Json<BatchUpload>, JsonRejection>,
) -> Result<Json<BatchResult>, ApiError> {
    let Json(batch) = body.map_err(unprocessable)?;
    Ok(Json(state.loader.batch_add(batch.documents).await))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    state
        .loader
        .get_document(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

pub async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<DocumentPatch>, JsonRejection>,
) -> Result<(StatusCode, Json<OperationResult>), ApiError> {
    let Json(patch) = body.map_err(unprocessable)?;
    if patch.is_empty() {
        return Err(detail(
            StatusCode::UNPROCESSABLE_ENTITY,
            "update must set at least one of content, title, category or tags",
        ));
    }
    if state.loader.get_document(&id).await.is_none() {
        return Err(not_found(&id));
    }
    Ok(into_reply(state.loader.update_document(&id, patch).await))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<OperationResult>), ApiError> {
    if state.loader.get_document(&id).await.is_none() {
        return Err(not_found(&id));
    }
    Ok(into_reply(state.loader.delete_document(&id).await))
}

pub async fn document_stats(
    State(state): State<AppState>,
) -> Result<Json<LoaderStatistics>, ApiError> {
    state.loader.statistics().await.map(Json).map_err(internal)
}
