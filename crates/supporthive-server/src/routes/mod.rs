pub mod chat;
pub mod config;
pub mod conversations;
pub mod documents;
pub mod health;
pub mod search;

use axum::http::StatusCode;
use axum::{Json, Router};

use crate::state::AppState;

/// Error half of every handler result: a status plus `{"detail": ...}`.
pub type ApiError = (StatusCode, Json<serde_json::Value>);

pub(crate) fn detail(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "detail": message.into() })))
}

pub(crate) fn internal(error: anyhow::Error) -> ApiError {
    tracing::error!("request failed: {error:#}");
    detail(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(chat::router())
        .merge(search::router())
        .merge(documents::router())
        .merge(conversations::router())
        .merge(config::router())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use supporthive_core::{InMemorySessionStore, Services, SupportConfig};
    use supporthive_knowledge::{SqliteIndex, StubEmbeddingProvider};
    use supporthive_provider::StubProvider;
    use supporthive_search::WebSearchClient;
    use tower::ServiceExt;

    use crate::state::AppState;

    pub fn test_state() -> AppState {
        let index = SqliteIndex::open_in_memory("test-index", 16).expect("in-memory index");
        Services::assemble_with_search(
            SupportConfig::default(),
            Arc::new(StubProvider),
            Arc::new(StubEmbeddingProvider::new(16)),
            Arc::new(index),
            Arc::new(InMemorySessionStore::new(50)),
            Some(WebSearchClient::default()),
        )
        .into()
    }

    pub fn app(state: AppState) -> Router {
        crate::create_router(state)
    }

    pub async fn send(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("send request");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }
}
