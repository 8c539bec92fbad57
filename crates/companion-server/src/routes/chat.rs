use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use companion::models::display::DisplayMessage;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const MESSAGE_REQUIRED: &str = "Message is required";

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatRequest {
    /// The request text, if one was sent
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|message| !message.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub messages: Vec<DisplayMessage>,
}

async fn handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!("Rejected chat request: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    let Some(message) = request.message() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": MESSAGE_REQUIRED })),
        )
            .into_response();
    };

    let messages = state.agent.run(message).await;
    (StatusCode::OK, Json(ChatResponse { messages })).into_response()
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handler))
        .with_state(state)
}
