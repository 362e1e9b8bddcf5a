//! Web API endpoints for monitoring.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::web::state::WebState;

/// Get per-tuner device status and local hold state.
///
/// Status is queried live; a failed query is reported inline rather than
/// failing the whole request.
pub async fn get_tuners(State(web_state): State<Arc<WebState>>) -> impl IntoResponse {
    let pool = web_state.allocator.pool();

    let mut tuners = Vec::with_capacity(pool.count());
    for index in 0..pool.count() {
        let held = pool.is_held(index);
        let entry = match pool.status(index).await {
            Ok(status) => json!({
                "index": index,
                "held": held,
                "idle": status.is_idle(),
                "status": status,
            }),
            Err(e) => json!({
                "index": index,
                "held": held,
                "error": e.to_string(),
            }),
        };
        tuners.push(entry);
    }

    Json(json!({
        "success": true,
        "device": pool.device().address(),
        "tuners": tuners,
        "count": tuners.len(),
        "held": pool.held_count(),
    }))
}

/// Get all active streaming sessions.
pub async fn get_sessions(State(web_state): State<Arc<WebState>>) -> impl IntoResponse {
    let sessions = web_state.session_registry.get_all().await;
    Json(json!({
        "success": true,
        "sessions": sessions,
        "count": sessions.len(),
    }))
}
