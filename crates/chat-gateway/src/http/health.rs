use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// `GET /health` — liveness probe. Always bypasses the Token Validator
/// (§4.1) and, best-effort, reports the current circuit-breaker state.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = state.breaker.status();
    Json(json!({
        "status": "ok",
        "circuit_breaker": {
            "state": format!("{:?}", status.state),
            "failure_count": status.failure_count,
        },
    }))
}
