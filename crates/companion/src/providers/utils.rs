use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

/// Convert internal Message format to OpenAI's API message specification
///
/// Every internal message maps onto exactly one OpenAI message, so the order of the
/// conversation is replayed verbatim.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    messages.iter().map(message_to_openai_spec).collect()
}

fn message_to_openai_spec(message: &Message) -> Value {
    if message.role == Role::Tool {
        if let Some(response) = message.content.iter().find_map(|c| c.as_tool_response()) {
            return json!({
                "role": "tool",
                "tool_call_id": response.id,
                "name": response.tool_name,
                "content": response.output,
            });
        }
    }

    let mut converted = json!({
        "role": message.role
    });
    let mut tool_calls = Vec::new();

    for content in &message.content {
        match content {
            MessageContent::Text(text) => {
                if !text.text.is_empty() {
                    converted["content"] = json!(text.text);
                }
            }
            MessageContent::ToolRequest(request) => {
                // a request whose arguments never parsed ends the run, so it is never replayed
                if let Ok(tool_call) = &request.tool_call {
                    tool_calls.push(json!({
                        "id": request.id,
                        "type": "function",
                        "function": {
                            "name": tool_call.name,
                            "arguments": tool_call.arguments.to_string(),
                        }
                    }));
                }
            }
            MessageContent::ToolResponse(response) => {
                converted["content"] = json!(response.output);
            }
        }
    }

    if !tool_calls.is_empty() {
        converted["tool_calls"] = json!(tool_calls);
    } else if converted.get("content").is_none() {
        converted["content"] = json!("");
    }

    converted
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: Value) -> Result<Message> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .cloned()
        .ok_or_else(|| anyhow!("No message in completion response"))?;

    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|text| text.as_str()) {
        message = message.with_text(text);
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            let call = match serde_json::from_str::<Value>(arguments) {
                Ok(params @ Value::Object(_)) => Ok(ToolCall::new(&function_name, params)),
                Ok(other) => Err(AgentError::InvalidParameters(format!(
                    "Tool use parameters for id {} must be a JSON object, got: {}",
                    id, other
                ))),
                Err(e) => Err(AgentError::InvalidParameters(format!(
                    "Could not interpret tool use parameters for id {}: {}",
                    id, e
                ))),
            };
            message = message.with_tool_request(id, call);
        }
    }

    Ok(message)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OPENAI_TOOL_USE_RESPONSE: &str = r#"{
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "1",
                    "type": "function",
                    "function": {
                        "name": "retrieve_dudraw_functions",
                        "arguments": "{\"query\": \"draw circle\"}"
                    }
                }]
            }
        }],
        "usage": {
            "prompt_tokens": 10,
            "completion_tokens": 25,
            "total_tokens": 35
        }
    }"#;

    #[test]
    fn test_messages_to_openai_spec() {
        let spec = messages_to_openai_spec(&[
            Message::user().with_text("draw a red circle"),
            Message::system().with_text("You are a DuDraw expert."),
        ]);

        assert_eq!(spec.len(), 2);
        assert_eq!(spec[0]["role"], "user");
        assert_eq!(spec[0]["content"], "draw a red circle");
        assert_eq!(spec[1]["role"], "system");
        assert_eq!(spec[1]["content"], "You are a DuDraw expert.");
    }

    #[test]
    fn test_messages_to_openai_spec_tool_exchange() {
        let messages = vec![
            Message::assistant()
                .with_text("Thought: look up circles")
                .with_tool_request(
                    "call_9",
                    Ok(ToolCall::new(
                        "retrieve_dudraw_functions",
                        json!({"query": "circle"}),
                    )),
                ),
            Message::tool().with_tool_response("call_9", "retrieve_dudraw_functions", "Function ID: x"),
        ];

        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec.len(), 2);
        assert_eq!(spec[0]["role"], "assistant");
        assert_eq!(spec[0]["content"], "Thought: look up circles");
        assert_eq!(spec[0]["tool_calls"][0]["id"], "call_9");
        assert_eq!(
            spec[0]["tool_calls"][0]["function"]["arguments"],
            r#"{"query":"circle"}"#
        );
        assert_eq!(spec[1]["role"], "tool");
        assert_eq!(spec[1]["tool_call_id"], spec[0]["tool_calls"][0]["id"]);
        assert_eq!(spec[1]["name"], "retrieve_dudraw_functions");
        assert_eq!(spec[1]["content"], "Function ID: x");
    }

    #[test]
    fn test_empty_assistant_message_gets_empty_content() {
        let spec = messages_to_openai_spec(&[Message::assistant().with_text("")]);
        assert_eq!(spec[0]["content"], "");
        assert!(spec[0].get("tool_calls").is_none());
    }

    #[test]
    fn test_tools_to_openai_spec() -> Result<()> {
        let tool = Tool::new(
            "calculate_expression",
            "Calculates a result",
            json!({
                "type": "object",
                "properties": {"expression": {"type": "string"}},
                "required": ["expression"]
            }),
        );

        let spec = tools_to_openai_spec(&[tool])?;

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "calculate_expression");
        assert_eq!(spec[0]["function"]["parameters"]["required"][0], "expression");
        Ok(())
    }

    #[test]
    fn test_tools_to_openai_spec_duplicate() {
        let tool = Tool::new("same", "Test tool", json!({"type": "object"}));
        let result = tools_to_openai_spec(&[tool.clone(), tool]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Duplicate tool name"));
    }

    #[test]
    fn test_openai_response_to_message_text() -> Result<()> {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Here is your circle"
                }
            }]
        });

        let message = openai_response_to_message(response)?;
        assert_eq!(message.content.len(), 1);
        assert_eq!(message.text(), Some("Here is your circle"));
        assert_eq!(message.role, Role::Assistant);
        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_valid_toolrequest() -> Result<()> {
        let response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        let message = openai_response_to_message(response)?;

        assert_eq!(message.text(), None);
        let requests = message.tool_requests();
        assert_eq!(requests.len(), 1);
        let tool_call = requests[0].tool_call.as_ref().unwrap();
        assert_eq!(tool_call.name, "retrieve_dudraw_functions");
        assert_eq!(tool_call.arguments, json!({"query": "draw circle"}));
        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_json_decode_error() -> Result<()> {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        response["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"] =
            json!("invalid json {");

        let message = openai_response_to_message(response)?;

        match &message.tool_requests()[0].tool_call {
            Err(AgentError::InvalidParameters(msg)) => {
                assert!(msg.starts_with("Could not interpret tool use parameters"));
            }
            other => panic!("Expected InvalidParameters error, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_non_object_arguments() -> Result<()> {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        response["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"] =
            json!("[1, 2]");

        let message = openai_response_to_message(response)?;
        assert!(matches!(
            message.tool_requests()[0].tool_call,
            Err(AgentError::InvalidParameters(_))
        ));
        Ok(())
    }

    #[test]
    fn test_openai_response_without_choices() {
        let result = openai_response_to_message(json!({"object": "chat.completion"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_check_openai_context_length_error() {
        let error = json!({
            "code": "context_length_exceeded",
            "message": "This message is too long"
        });

        let result = check_openai_context_length_error(&error);
        assert_eq!(
            result.unwrap().to_string(),
            "Context length exceeded. Message: This message is too long"
        );

        let error = json!({
            "code": "other_error",
            "message": "Some other error"
        });
        assert!(check_openai_context_length_error(&error).is_none());
    }
}
