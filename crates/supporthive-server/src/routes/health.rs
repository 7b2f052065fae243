use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

impl From<bool> for ServiceStatus {
    fn from(up: bool) -> Self {
        if up {
            Self::Healthy
        } else {
            Self::Unhealthy
        }
    }
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub api: ServiceStatus,
    pub llm_provider: ServiceStatus,
    pub knowledge_store: ServiceStatus,
    pub search_provider: ServiceStatus,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: ServiceHealth,
    pub timestamp: DateTime<Utc>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/", get(health))
}

/// Always 200; a failing collaborator only downgrades `status`.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let agent = state.agent.health().await;
    let status = if agent.is_healthy() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        services: ServiceHealth {
            api: ServiceStatus::Healthy,
            llm_provider: agent.llm_provider.into(),
            knowledge_store: agent.knowledge_store.into(),
            search_provider: agent.search_provider.into(),
        },
        timestamp: Utc::now(),
    })
}
