//! Model gateway port
//!
//! Defines the interface for communicating with the backend model server.
//! The adapter (infrastructure layer) is the only component aware of the
//! backend's native schema; everything above this port speaks the domain
//! Message/ToolCall model.

use async_trait::async_trait;
use proxy_domain::{Message, ToolDefinition};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from the backend model collaborator.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Backend returned an invalid response shape: {0}")]
    InvalidResponse(String),

    #[error("Backend request failed: {0}")]
    RequestFailed(String),

    #[error("Backend request timed out")]
    Timeout,
}

impl GatewayError {
    /// Connection-level failures are worth one bounded retry; shape and
    /// protocol failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::ConnectionError(_) | GatewayError::Timeout)
    }
}

/// Token accounting for one model turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn accumulate(&mut self, other: Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// One complete model turn: an assistant message (possibly carrying tool
/// calls) plus usage accounting.
#[derive(Debug, Clone)]
pub struct ModelTurn {
    pub message: Message,
    pub usage: Usage,
}

/// A request to the backend: exported history plus declared tools.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// An event in a streaming model turn.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A text chunk from the model, in generation order.
    Delta(String),
    /// The complete turn (terminal event). Tool calls, if any, are only
    /// final here — they are not executed until the full turn is in.
    Completed(ModelTurn),
    /// An error that occurred mid-stream (terminal event).
    Error(String),
}

/// Handle for consuming a streaming model turn.
///
/// Wraps a bounded `mpsc::Receiver<StreamEvent>`; the bounded channel is
/// the backpressure point — a slow consumer pauses the reader task rather
/// than buffering the backend's output unboundedly.
pub struct TurnStream {
    pub receiver: mpsc::Receiver<StreamEvent>,
}

impl TurnStream {
    pub fn new(receiver: mpsc::Receiver<StreamEvent>) -> Self {
        Self { receiver }
    }

    /// Drain the stream and return the completed turn, discarding deltas.
    pub async fn collect_turn(mut self) -> Result<ModelTurn, GatewayError> {
        while let Some(event) = self.receiver.recv().await {
            match event {
                StreamEvent::Delta(_) => continue,
                StreamEvent::Completed(turn) => return Ok(turn),
                StreamEvent::Error(e) => return Err(GatewayError::RequestFailed(e)),
            }
        }
        Err(GatewayError::InvalidResponse(
            "stream closed before completion".to_string(),
        ))
    }
}

/// Gateway to the backend model server.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Run one full (non-streaming) model turn.
    async fn chat(&self, request: ChatRequest) -> Result<ModelTurn, GatewayError>;

    /// Run one model turn, streaming deltas as they are generated.
    ///
    /// Default implementation calls `chat()` and emits a single
    /// `Completed` event, so non-streaming adapters work unchanged.
    async fn chat_stream(&self, request: ChatRequest) -> Result<TurnStream, GatewayError> {
        let turn = self.chat(request).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(StreamEvent::Completed(turn)).await;
        Ok(TurnStream::new(rx))
    }

    /// Models the backend advertises as available.
    async fn available_models(&self) -> Result<Vec<String>, GatewayError>;
}
