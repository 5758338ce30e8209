//! OpenAI protocol translation
//!
//! Decodes OpenAI-shaped chat completion requests into the domain model
//! and encodes loop outcomes back. This module owns the client-facing
//! wire schema; the backend's native schema lives in the infrastructure
//! layer. Nothing outside the two translators touches either wire shape.

use std::collections::HashMap;

use proxy_domain::{
    Confirmations, Message, PermissionClass, ProxyError, ToolCall, ToolDefinition, ToolParameter,
};
use proxy_application::Usage;
use serde::Deserialize;
use serde_json::{Value, json};

/// Injected when the inbound request carries no system message.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI coding assistant.";

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: Option<String>,
    pub messages: Option<Vec<WireMessage>>,
    #[serde(default)]
    pub tools: Vec<WireTool>,
    #[serde(default)]
    pub stream: bool,
    /// Proxy extension: stable session identity across requests.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Proxy extension: confirmation tokens for confirm-required tool
    /// calls, scoped to exact call ids.
    #[serde(default)]
    pub confirmed_tool_calls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    pub function: WireFunctionCall,
}

/// OpenAI delivers tool-call arguments as a JSON-encoded string.
#[derive(Debug, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub struct WireTool {
    pub function: WireFunctionDef,
}

#[derive(Debug, Deserialize)]
pub struct WireFunctionDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}

/// A fully decoded request, expressed in the domain model.
#[derive(Debug)]
pub struct DecodedRequest {
    pub session_hint: Option<String>,
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub stream: bool,
    pub confirmations: Confirmations,
}

pub fn decode_request(request: ChatCompletionRequest) -> Result<DecodedRequest, ProxyError> {
    let model = request
        .model
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ProxyError::MalformedRequest("missing 'model'".to_string()))?;
    let wire_messages = request
        .messages
        .ok_or_else(|| ProxyError::MalformedRequest("missing 'messages'".to_string()))?;

    let mut messages = Vec::with_capacity(wire_messages.len() + 1);
    for wire in wire_messages {
        messages.push(decode_message(wire)?);
    }
    ensure_system_prompt(&mut messages);

    let tools = request
        .tools
        .into_iter()
        .map(decode_tool)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DecodedRequest {
        session_hint: request.session_id,
        model,
        messages,
        tools,
        stream: request.stream,
        confirmations: Confirmations::from_ids(request.confirmed_tool_calls),
    })
}

fn decode_message(wire: WireMessage) -> Result<Message, ProxyError> {
    let content = wire.content.unwrap_or_default();
    match wire.role.as_str() {
        "system" => Ok(Message::system(content)),
        "user" => Ok(Message::user(content)),
        "assistant" => {
            if wire.tool_calls.is_empty() {
                Ok(Message::assistant(content))
            } else {
                let calls = wire
                    .tool_calls
                    .into_iter()
                    .map(decode_tool_call)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Message::assistant_with_tool_calls(content, calls))
            }
        }
        "tool" => {
            let call_id = wire.tool_call_id.ok_or_else(|| {
                ProxyError::MalformedRequest("tool message without 'tool_call_id'".to_string())
            })?;
            Ok(Message::tool(call_id, content))
        }
        other => Err(ProxyError::MalformedRequest(format!(
            "unknown role '{other}'"
        ))),
    }
}

fn decode_tool_call(wire: WireToolCall) -> Result<ToolCall, ProxyError> {
    let arguments: HashMap<String, Value> = if wire.function.arguments.is_empty() {
        HashMap::new()
    } else {
        serde_json::from_str(&wire.function.arguments).map_err(|e| {
            ProxyError::MalformedRequest(format!(
                "tool call '{}' has non-object arguments: {e}",
                wire.id
            ))
        })?
    };
    let mut call = ToolCall::with_id(wire.id, wire.function.name);
    call.arguments = arguments;
    Ok(call)
}

/// Client tool declarations are advertised to the backend verbatim;
/// permission classes are only ever taken from the registry, so a
/// client-declared `run_command` cannot relax the confirmation policy.
fn decode_tool(wire: WireTool) -> Result<ToolDefinition, ProxyError> {
    let mut definition = ToolDefinition::new(
        wire.function.name,
        wire.function.description,
        PermissionClass::Auto,
    );
    let empty = serde_json::Map::new();
    let properties = wire.function.parameters["properties"]
        .as_object()
        .unwrap_or(&empty);
    let required: Vec<&str> = wire.function.parameters["required"]
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for (name, schema) in properties {
        let param_type = schema["type"].as_str().unwrap_or("string");
        let description = schema["description"].as_str().unwrap_or_default();
        definition = definition.with_parameter(
            ToolParameter::new(name, description, required.contains(&name.as_str()))
                .with_type(param_type),
        );
    }
    Ok(definition)
}

/// Insert the default system prompt when the history does not begin
/// with a system message.
fn ensure_system_prompt(messages: &mut Vec<Message>) {
    let has_system = messages
        .first()
        .map(|m| m.role == proxy_domain::Role::System)
        .unwrap_or(false);
    if !has_system {
        messages.insert(0, Message::system(DEFAULT_SYSTEM_PROMPT));
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Encode the final (non-streaming) chat completion.
pub fn encode_response(
    response_id: &str,
    created: i64,
    model: &str,
    message: &Message,
    usage: &Usage,
) -> Value {
    let finish_reason = if message.has_tool_calls() {
        "tool_calls"
    } else {
        "stop"
    };
    json!({
        "id": response_id,
        "object": "chat.completion",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "message": encode_message(message),
            "finish_reason": finish_reason,
        }],
        "usage": {
            "prompt_tokens": usage.prompt_tokens,
            "completion_tokens": usage.completion_tokens,
            "total_tokens": usage.total_tokens(),
        },
    })
}

fn encode_message(message: &Message) -> Value {
    let mut encoded = json!({
        "role": "assistant",
        "content": message.content,
    });
    if message.has_tool_calls() {
        encoded["tool_calls"] = Value::Array(
            message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": serde_json::to_string(&call.arguments)
                                .unwrap_or_else(|_| "{}".to_string()),
                        },
                    })
                })
                .collect(),
        );
    }
    encoded
}

/// One streaming chunk carrying a content delta. The first chunk of a
/// stream also announces the assistant role.
pub fn encode_stream_chunk(
    response_id: &str,
    created: i64,
    model: &str,
    delta: &str,
    first: bool,
) -> Value {
    let delta = if first {
        json!({"role": "assistant", "content": delta})
    } else {
        json!({"content": delta})
    };
    json!({
        "id": response_id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{"index": 0, "delta": delta, "finish_reason": null}],
    })
}

/// The terminal chunk before the `[DONE]` sentinel.
pub fn encode_stream_end(
    response_id: &str,
    created: i64,
    model: &str,
    finish_reason: &str,
) -> Value {
    json!({
        "id": response_id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{"index": 0, "delta": {}, "finish_reason": finish_reason}],
    })
}

/// `GET /v1/models` body.
pub fn encode_models(models: &[String]) -> Value {
    json!({
        "object": "list",
        "data": models
            .iter()
            .map(|name| json!({"id": name, "object": "model", "owned_by": "library"}))
            .collect::<Vec<_>>(),
    })
}

/// Structured error body for request-level failures.
pub fn encode_error(error: &ProxyError) -> Value {
    json!({
        "error": {
            "message": error.to_string(),
            "code": error.code(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_domain::Role;

    fn request_json(body: Value) -> ChatCompletionRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn decode_requires_model_and_messages() {
        let err = decode_request(request_json(json!({"messages": []}))).unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest(_)));

        let err = decode_request(request_json(json!({"model": "m"}))).unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest(_)));
    }

    #[test]
    fn decode_injects_default_system_prompt() {
        let decoded = decode_request(request_json(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
        })))
        .unwrap();
        assert_eq!(decoded.messages[0].role, Role::System);
        assert_eq!(decoded.messages[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(decoded.messages[1].content, "hi");
    }

    #[test]
    fn decode_keeps_client_system_prompt() {
        let decoded = decode_request(request_json(json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hi"},
            ],
        })))
        .unwrap();
        assert_eq!(decoded.messages.len(), 2);
        assert_eq!(decoded.messages[0].content, "be terse");
    }

    #[test]
    fn decode_parses_assistant_tool_calls_and_tool_replies() {
        let decoded = decode_request(request_json(json!({
            "model": "m",
            "messages": [
                {"role": "user", "content": "list"},
                {"role": "assistant", "content": null, "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "list_files", "arguments": "{\"directory\": \".\"}"},
                }]},
                {"role": "tool", "content": "a.txt", "tool_call_id": "call_1"},
            ],
        })))
        .unwrap();
        // Index 0 is the injected system prompt.
        let assistant = &decoded.messages[2];
        assert!(assistant.has_tool_calls());
        assert_eq!(assistant.tool_calls[0].id, "call_1");
        assert_eq!(assistant.tool_calls[0].get_string("directory"), Some("."));
        assert_eq!(decoded.messages[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn decode_rejects_unknown_role_and_orphan_tool_message() {
        let err = decode_request(request_json(json!({
            "model": "m",
            "messages": [{"role": "wizard", "content": "?"}],
        })))
        .unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest(_)));

        let err = decode_request(request_json(json!({
            "model": "m",
            "messages": [{"role": "tool", "content": "out"}],
        })))
        .unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest(_)));
    }

    #[test]
    fn decode_tool_declaration_builds_schema() {
        let decoded = decode_request(request_json(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "x"}],
            "tools": [{
                "type": "function",
                "function": {
                    "name": "lookup",
                    "description": "Look something up",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "key": {"type": "string", "description": "The key"},
                            "limit": {"type": "number"},
                        },
                        "required": ["key"],
                    },
                },
            }],
        })))
        .unwrap();
        let tool = &decoded.tools[0];
        assert_eq!(tool.name, "lookup");
        let key = tool.parameters.iter().find(|p| p.name == "key").unwrap();
        assert!(key.required);
        let limit = tool.parameters.iter().find(|p| p.name == "limit").unwrap();
        assert!(!limit.required);
        assert_eq!(limit.param_type, "number");
    }

    #[test]
    fn decode_collects_confirmation_tokens() {
        let decoded = decode_request(request_json(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "x"}],
            "confirmed_tool_calls": ["call_9"],
        })))
        .unwrap();
        assert!(decoded.confirmations.contains("call_9"));
        assert!(!decoded.confirmations.contains("call_8"));
    }

    #[test]
    fn encode_plain_answer_finishes_with_stop() {
        let body = encode_response(
            "chatcmpl-1",
            1000,
            "m",
            &Message::assistant("done"),
            &Usage {
                prompt_tokens: 3,
                completion_tokens: 4,
            },
        );
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
        assert_eq!(body["choices"][0]["message"]["content"], "done");
        assert_eq!(body["usage"]["total_tokens"], 7);
    }

    #[test]
    fn encode_unresolved_tool_calls_finish_with_tool_calls() {
        let call = ToolCall::with_id("call_7", "read_file").with_arg("filepath", "a.txt");
        let message = Message::assistant_with_tool_calls("", vec![call]);
        let body = encode_response("chatcmpl-1", 1000, "m", &message, &Usage::default());
        assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");
        let encoded_call = &body["choices"][0]["message"]["tool_calls"][0];
        assert_eq!(encoded_call["id"], "call_7");
        // Arguments are re-encoded as a JSON string, as OpenAI clients expect.
        let args: Value =
            serde_json::from_str(encoded_call["function"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(args["filepath"], "a.txt");
    }

    #[test]
    fn stream_chunks_have_expected_shape() {
        let first = encode_stream_chunk("chatcmpl-1", 1000, "m", "hel", true);
        assert_eq!(first["object"], "chat.completion.chunk");
        assert_eq!(first["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(first["choices"][0]["delta"]["content"], "hel");

        let later = encode_stream_chunk("chatcmpl-1", 1000, "m", "lo", false);
        assert!(later["choices"][0]["delta"].get("role").is_none());

        let end = encode_stream_end("chatcmpl-1", 1000, "m", "stop");
        assert_eq!(end["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn models_list_is_openai_shaped() {
        let body = encode_models(&["llama3.1".to_string(), "mistral".to_string()]);
        assert_eq!(body["object"], "list");
        assert_eq!(body["data"][0]["id"], "llama3.1");
        assert_eq!(body["data"][1]["object"], "model");
    }
}
