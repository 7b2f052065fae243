use axum::{extract::State, routing::get, Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/config/", get(get_config))
}

pub async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.config.public_view())
}
