use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

async fn handler(State(state): State<AppState>) -> Response {
    match state.retriever.function_count().await {
        Ok(functions_loaded) => Json(json!({
            "status": "ready",
            "functions_loaded": functions_loaded,
            "data_source": state.data_source,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Status check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(handler))
        .with_state(state)
}
