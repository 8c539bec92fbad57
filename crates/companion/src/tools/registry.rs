use std::sync::Arc;

use super::{CalculateExpression, RetrieveFunctions, ToolHandler};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};
use crate::retrieval::FunctionRetriever;

/// Name to handler mapping, kept in registration order
#[derive(Default)]
pub struct ToolRegistry {
    handlers: Vec<Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The DuDraw toolset: function lookup, then the calculator
    pub fn standard(retriever: Arc<FunctionRetriever>) -> AgentResult<Self> {
        let mut registry = Self::new();
        registry.register(RetrieveFunctions::new(retriever))?;
        registry.register(CalculateExpression::new())?;
        Ok(registry)
    }

    pub fn register<H: ToolHandler + 'static>(&mut self, handler: H) -> AgentResult<()> {
        let name = &handler.tool().name;
        if self.get(name).is_some() {
            return Err(AgentError::Internal(format!(
                "Duplicate tool name: {}",
                name
            )));
        }
        self.handlers.push(Box::new(handler));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolHandler> {
        self.handlers
            .iter()
            .find(|handler| handler.tool().name == name)
            .map(|handler| handler.as_ref())
    }

    /// Declarations for every registered tool, in registration order
    pub fn tools(&self) -> Vec<Tool> {
        self.handlers
            .iter()
            .map(|handler| handler.tool().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn summary(&self, tool_call: &ToolCall) -> String {
        match self.get(&tool_call.name) {
            Some(handler) => handler.summary(tool_call),
            None => format!("Calling tool: {}", tool_call.name),
        }
    }

    pub fn observation(&self, name: &str, output: &str) -> Option<String> {
        self.get(name).and_then(|handler| handler.observation(output))
    }

    /// Run a tool call, folding every failure into the returned text
    pub async fn dispatch(&self, tool_call: &ToolCall) -> String {
        let Some(handler) = self.get(&tool_call.name) else {
            tracing::warn!(tool = %tool_call.name, "model requested an unknown tool");
            return format!("Error: Tool '{}' not found.", tool_call.name);
        };

        match handler.call(tool_call).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = %tool_call.name, error = %e, "tool call failed");
                format!("Error calling tool '{}': {}", tool_call.name, e)
            }
        }
    }
}
