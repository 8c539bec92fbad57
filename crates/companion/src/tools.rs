//! The tools the model may call while working on a request.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AgentResult;
use crate::models::tool::{Tool, ToolCall};

pub mod calculator;
pub mod lookup;
pub mod registry;

pub use calculator::CalculateExpression;
pub use lookup::RetrieveFunctions;
pub use registry::ToolRegistry;

/// A single callable tool: its declaration plus the code that runs it
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The declaration sent to the model
    fn tool(&self) -> &Tool;

    /// One-line description of a pending call, shown to the user
    fn summary(&self, tool_call: &ToolCall) -> String;

    /// Optional user-facing digest of the tool's output
    fn observation(&self, _output: &str) -> Option<String> {
        None
    }

    /// Run the tool. The returned text becomes the tool result the model sees.
    async fn call(&self, tool_call: &ToolCall) -> AgentResult<String>;
}

/// Render an argument for display, `N/A` when the model left it out
pub(crate) fn display_arg(tool_call: &ToolCall, key: &str) -> String {
    match tool_call.arguments.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "N/A".to_string(),
    }
}

/// Truncate to `limit` characters, marking the cut with `...`
pub fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
