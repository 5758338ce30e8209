//! Ollama wire protocol
//!
//! Typed request/response shapes for the Ollama chat API plus the
//! conversions to and from the domain message model. This module is the
//! only place aware of the backend's native schema.

use std::collections::HashMap;

use proxy_domain::{Message, Role, ToolCall, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// `POST /api/chat` request body.
#[derive(Debug, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<OllamaTool>,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaToolCall {
    pub function: OllamaFunctionCall,
}

/// Ollama delivers arguments as a parsed JSON object, not a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: HashMap<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct OllamaTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OllamaFunctionDef,
}

#[derive(Debug, Serialize)]
pub struct OllamaFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One NDJSON line of a streaming chat response; also the whole body of a
/// non-streaming one.
#[derive(Debug, Deserialize)]
pub struct OllamaChatChunk {
    #[serde(default)]
    pub message: Option<OllamaMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    #[serde(default)]
    pub eval_count: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `GET /api/tags` response.
#[derive(Debug, Deserialize)]
pub struct OllamaTagsResponse {
    #[serde(default)]
    pub models: Vec<OllamaTagModel>,
}

#[derive(Debug, Deserialize)]
pub struct OllamaTagModel {
    pub name: String,
}

/// Domain message → wire message.
pub fn to_wire_message(message: &Message) -> OllamaMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    OllamaMessage {
        role: role.to_string(),
        content: message.content.clone(),
        tool_calls: message
            .tool_calls
            .iter()
            .map(|call| OllamaToolCall {
                function: OllamaFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect(),
    }
}

/// Wire assistant message → domain message.
///
/// Ollama does not assign tool-call identifiers, so each call gets a
/// fresh one here; the same synthesized ids flow back to the client and
/// into the tool results, keeping the id-join intact end to end.
pub fn from_wire_message(message: OllamaMessage) -> Message {
    if message.tool_calls.is_empty() {
        return Message::assistant(message.content);
    }
    let calls = message
        .tool_calls
        .into_iter()
        .map(|wire| {
            let mut call = ToolCall::new(wire.function.name);
            call.arguments = wire.function.arguments;
            call
        })
        .collect();
    Message::assistant_with_tool_calls(message.content, calls)
}

/// Domain tool definition → the JSON-schema declaration Ollama expects.
pub fn to_wire_tool(definition: &ToolDefinition) -> OllamaTool {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for param in &definition.parameters {
        properties.insert(
            param.name.clone(),
            json!({
                "type": schema_type(&param.param_type),
                "description": param.description,
            }),
        );
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }
    OllamaTool {
        tool_type: "function".to_string(),
        function: OllamaFunctionDef {
            name: definition.name.clone(),
            description: definition.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        },
    }
}

// Path parameters are a guard concern, not a schema concept.
fn schema_type(param_type: &str) -> &str {
    match param_type {
        "number" => "number",
        "integer" => "integer",
        "boolean" => "boolean",
        _ => "string",
    }
}
