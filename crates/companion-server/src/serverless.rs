//! Function-as-a-service adapter.
//!
//! Each invocation receives one `{httpMethod, body}` event and answers with a
//! `{statusCode, headers, body}` response. Only the chat function builds an agent;
//! the status function reports configuration without touching the retrieval store.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::configuration::Settings;
use crate::routes::chat::{ChatRequest, ChatResponse, MESSAGE_REQUIRED};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionEvent {
    #[serde(default)]
    pub http_method: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Chat,
    Status,
}

impl FromStr for Function {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chat" => Ok(Function::Chat),
            "status" => Ok(Function::Status),
            other => Err(anyhow!("Unknown function: {} (expected chat or status)", other)),
        }
    }
}

impl Function {
    fn allowed_methods(&self) -> &'static str {
        match self {
            Function::Chat => "POST, OPTIONS",
            Function::Status => "GET, OPTIONS",
        }
    }

    pub async fn handle(&self, event: &FunctionEvent, settings: &Settings) -> FunctionResponse {
        let headers = cors_headers(self.allowed_methods());
        if event.http_method.eq_ignore_ascii_case("OPTIONS") {
            return FunctionResponse {
                status_code: 200,
                headers,
                body: String::new(),
            };
        }

        let (status_code, body) = match self {
            Function::Chat => chat(event, settings).await,
            Function::Status => status(settings),
        };
        FunctionResponse {
            status_code,
            headers,
            body: body.to_string(),
        }
    }
}

fn cors_headers(methods: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
        (
            "Access-Control-Allow-Headers".to_string(),
            "Content-Type".to_string(),
        ),
        (
            "Access-Control-Allow-Methods".to_string(),
            methods.to_string(),
        ),
    ])
}

async fn chat(event: &FunctionEvent, settings: &Settings) -> (u16, serde_json::Value) {
    if !settings.provider.has_api_key() {
        return (500, json!({ "error": "OPENAI_API_KEY not configured" }));
    }

    let request: ChatRequest = match serde_json::from_str(event.body.as_deref().unwrap_or("{}")) {
        Ok(request) => request,
        Err(e) => return (500, json!({ "error": e.to_string() })),
    };
    let Some(message) = request.message() else {
        return (400, json!({ "error": MESSAGE_REQUIRED }));
    };

    match AppState::from_settings(settings).await {
        Ok(state) => {
            let messages = state.agent.run(message).await;
            (200, json!(ChatResponse { messages }))
        }
        Err(e) => {
            tracing::error!("Failed to start agent: {:#}", e);
            (500, json!({ "error": e.to_string() }))
        }
    }
}

fn status(settings: &Settings) -> (u16, serde_json::Value) {
    let configured = settings.provider.has_api_key();
    (
        200,
        json!({
            "status": if configured { "ready" } else { "not_configured" },
            "api_key_configured": configured,
            "data_source": settings.retrieval.data_source(),
        }),
    )
}
