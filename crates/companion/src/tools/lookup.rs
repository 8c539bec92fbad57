use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{display_arg, preview, ToolHandler};
use crate::errors::AgentResult;
use crate::models::tool::{Tool, ToolCall};
use crate::retrieval::FunctionRetriever;

pub const TOOL_NAME: &str = "retrieve_dudraw_functions";

/// Characters of retrieved text echoed back to the user
const OBSERVATION_PREVIEW: usize = 500;

/// The `retrieve_dudraw_functions` tool, backed by the function retriever
pub struct RetrieveFunctions {
    tool: Tool,
    retriever: Arc<FunctionRetriever>,
}

impl RetrieveFunctions {
    pub fn new(retriever: Arc<FunctionRetriever>) -> Self {
        let tool = Tool::new(
            TOOL_NAME,
            "Retrieve relevant DuDraw function information based on a natural language query. Use this tool when you need to understand specific DuDraw drawing, input, or setting functions to generate code.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "A concise natural language query describing the type of DuDraw functions needed (e.g., 'functions for drawing circles', 'keyboard input functions', 'setting canvas size')."
                    }
                },
                "required": ["query"]
            }),
        );
        Self { tool, retriever }
    }
}

#[async_trait]
impl ToolHandler for RetrieveFunctions {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    fn summary(&self, tool_call: &ToolCall) -> String {
        format!("Looking up DuDraw functions: {}", display_arg(tool_call, "query"))
    }

    fn observation(&self, output: &str) -> Option<String> {
        Some(format!(
            "Found DuDraw function information:\n{}",
            preview(output, OBSERVATION_PREVIEW)
        ))
    }

    async fn call(&self, tool_call: &ToolCall) -> AgentResult<String> {
        let query = tool_call.string_arg("query");
        tracing::debug!(query, k = self.retriever.top_k(), "retrieving functions");
        Ok(self.retriever.retrieve(query, self.retriever.top_k()).await)
    }
}
