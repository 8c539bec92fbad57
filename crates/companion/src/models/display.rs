use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::role::Role;

/// What an entry of the run trace represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayKind {
    Thought,
    ToolCall,
    ToolObservation,
    Final,
    Error,
}

/// One entry of the trace an agent run hands back to its caller.
///
/// Adapters render these however suits them (a JSON list, a live terminal stream);
/// the agent loop is the only producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: DisplayKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Value>,
}

impl DisplayMessage {
    fn assistant<S: Into<String>>(kind: DisplayKind, content: S) -> Self {
        Self {
            role: Role::Assistant,
            kind,
            content: content.into(),
            tool_name: None,
            tool_args: None,
        }
    }

    pub fn thought<S: Into<String>>(content: S) -> Self {
        Self::assistant(DisplayKind::Thought, content)
    }

    pub fn tool_call<S, N>(content: S, tool_name: N, tool_args: Value) -> Self
    where
        S: Into<String>,
        N: Into<String>,
    {
        Self {
            tool_name: Some(tool_name.into()),
            tool_args: Some(tool_args),
            ..Self::assistant(DisplayKind::ToolCall, content)
        }
    }

    pub fn tool_observation<S: Into<String>>(content: S) -> Self {
        Self::assistant(DisplayKind::ToolObservation, content)
    }

    pub fn final_answer<S: Into<String>>(content: S) -> Self {
        Self::assistant(DisplayKind::Final, content)
    }

    pub fn error<S: Into<String>>(content: S) -> Self {
        Self::assistant(DisplayKind::Error, content)
    }
}
