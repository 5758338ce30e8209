//! Ollama gateway — the concrete [`ModelGateway`].

use async_trait::async_trait;
use futures::StreamExt;
use proxy_application::{
    ChatRequest, GatewayError, ModelGateway, ModelTurn, StreamEvent, TurnStream, Usage,
};
use proxy_domain::Message;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use super::protocol::{
    OllamaChatChunk, OllamaChatRequest, OllamaTagsResponse, from_wire_message, to_wire_message,
    to_wire_tool,
};

/// Capacity of the streaming event channel; the bound is the
/// backpressure point between the backend reader and a slow client.
const STREAM_CHANNEL_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct OllamaGateway {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaGateway {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client }
    }

    fn build_request(&self, request: &ChatRequest, stream: bool) -> OllamaChatRequest {
        OllamaChatRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(to_wire_message).collect(),
            tools: request.tools.iter().map(to_wire_tool).collect(),
            stream,
        }
    }
}

fn classify(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else if e.is_connect() {
        GatewayError::ConnectionError(e.to_string())
    } else {
        GatewayError::RequestFailed(e.to_string())
    }
}

#[async_trait]
impl ModelGateway for OllamaGateway {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn chat(&self, request: ChatRequest) -> Result<ModelTurn, GatewayError> {
        let body = self.build_request(&request, false);
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(classify)?;

        if !response.status().is_success() {
            return Err(GatewayError::RequestFailed(format!(
                "backend returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let chunk: OllamaChatChunk = response.json().await.map_err(classify)?;
        if let Some(error) = chunk.error {
            return Err(GatewayError::RequestFailed(error));
        }
        let message = chunk
            .message
            .ok_or_else(|| GatewayError::InvalidResponse("response without message".to_string()))?;

        Ok(ModelTurn {
            message: from_wire_message(message),
            usage: Usage {
                prompt_tokens: chunk.prompt_eval_count.unwrap_or(0),
                completion_tokens: chunk.eval_count.unwrap_or(0),
            },
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn chat_stream(&self, request: ChatRequest) -> Result<TurnStream, GatewayError> {
        let body = self.build_request(&request, true);
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(classify)?;

        if !response.status().is_success() {
            return Err(GatewayError::RequestFailed(format!(
                "backend returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut lines = LineAssembler::new();
            let mut turn = TurnAssembler::new();

            while let Some(next) = bytes.next().await {
                let data = match next {
                    Ok(data) => data,
                    Err(e) => {
                        warn!(error = %e, "Stream read failed");
                        let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                for line in lines.push(&data) {
                    match turn.consume(&line) {
                        Ok(Some(delta)) => {
                            // A full channel here pauses this reader, which
                            // in turn stops pulling from the backend.
                            if tx.send(StreamEvent::Delta(delta)).await.is_err() {
                                debug!("Stream consumer dropped, abandoning turn");
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = tx.send(StreamEvent::Error(e)).await;
                            return;
                        }
                    }
                    if turn.is_done() {
                        let _ = tx.send(StreamEvent::Completed(turn.finish())).await;
                        return;
                    }
                }
            }
            let _ = tx
                .send(StreamEvent::Error(
                    "stream ended before completion".to_string(),
                ))
                .await;
        });

        Ok(TurnStream::new(rx))
    }

    async fn available_models(&self) -> Result<Vec<String>, GatewayError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(classify)?;
        if !response.status().is_success() {
            return Err(GatewayError::RequestFailed(format!(
                "backend returned HTTP {}",
                response.status().as_u16()
            )));
        }
        let tags: OllamaTagsResponse = response.json().await.map_err(classify)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Reassembles NDJSON lines from arbitrary byte-chunk boundaries.
struct LineAssembler {
    buffer: String,
}

impl LineAssembler {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(data));
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }
}

/// Accumulates one streamed model turn from parsed chunks.
struct TurnAssembler {
    content: String,
    tool_calls: Vec<super::protocol::OllamaToolCall>,
    usage: Usage,
    done: bool,
}

impl TurnAssembler {
    fn new() -> Self {
        Self {
            content: String::new(),
            tool_calls: Vec::new(),
            usage: Usage::default(),
            done: false,
        }
    }

    /// Feed one NDJSON line; returns the content delta to forward, if any.
    fn consume(&mut self, line: &str) -> Result<Option<String>, String> {
        let chunk: OllamaChatChunk =
            serde_json::from_str(line).map_err(|e| format!("invalid stream chunk: {e}"))?;
        if let Some(error) = chunk.error {
            return Err(error);
        }

        let mut delta = None;
        if let Some(message) = chunk.message {
            if !message.content.is_empty() {
                self.content.push_str(&message.content);
                delta = Some(message.content);
            }
            self.tool_calls.extend(message.tool_calls);
        }
        if chunk.done {
            self.usage = Usage {
                prompt_tokens: chunk.prompt_eval_count.unwrap_or(0),
                completion_tokens: chunk.eval_count.unwrap_or(0),
            };
            self.done = true;
        }
        Ok(delta)
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(self) -> ModelTurn {
        let wire = super::protocol::OllamaMessage {
            role: "assistant".to_string(),
            content: self.content,
            tool_calls: self.tool_calls,
        };
        let message: Message = from_wire_message(wire);
        ModelTurn {
            message,
            usage: self.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_assembler_handles_split_lines() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.push(b"{\"a\":").is_empty());
        let lines = assembler.push(b"1}\n{\"b\":2}\n{\"c\"");
        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
        let lines = assembler.push(b":3}\n");
        assert_eq!(lines, vec![r#"{"c":3}"#]);
    }

    #[test]
    fn turn_assembler_accumulates_deltas_and_usage() {
        let mut turn = TurnAssembler::new();
        let delta = turn
            .consume(r#"{"message":{"role":"assistant","content":"hel"},"done":false}"#)
            .unwrap();
        assert_eq!(delta.as_deref(), Some("hel"));
        turn.consume(r#"{"message":{"role":"assistant","content":"lo"},"done":false}"#)
            .unwrap();
        turn.consume(r#"{"message":{"role":"assistant","content":""},"done":true,"prompt_eval_count":7,"eval_count":9}"#)
            .unwrap();
        assert!(turn.is_done());

        let finished = turn.finish();
        assert_eq!(finished.message.content, "hello");
        assert_eq!(finished.usage.prompt_tokens, 7);
        assert_eq!(finished.usage.completion_tokens, 9);
    }

    #[test]
    fn turn_assembler_collects_tool_calls() {
        let mut turn = TurnAssembler::new();
        turn.consume(
            r#"{"message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"list_files","arguments":{"directory":"."}}}]},"done":false}"#,
        )
        .unwrap();
        turn.consume(r#"{"message":{"role":"assistant","content":""},"done":true}"#)
            .unwrap();

        let finished = turn.finish();
        assert!(finished.message.has_tool_calls());
        assert_eq!(finished.message.tool_calls[0].name, "list_files");
    }

    #[test]
    fn turn_assembler_surfaces_backend_error() {
        let mut turn = TurnAssembler::new();
        let err = turn
            .consume(r#"{"error":"model not loaded"}"#)
            .unwrap_err();
        assert_eq!(err, "model not loaded");
    }
}
