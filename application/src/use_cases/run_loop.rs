//! Agent loop orchestrator
//!
//! Runs the model ↔ tool round-trip for one client request:
//!
//! ```text
//! acquire session → call model → tool calls? ─ no ─→ finish
//!        ↑                          │ yes
//!        └── append results ←── gate + execute (concurrent, joined by id)
//! ```
//!
//! The loop owns consistency: the assistant message carrying tool calls
//! and the tool messages answering them are appended together, so the
//! persisted history never contains a dangling call or an orphaned
//! result.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use proxy_domain::{
    AgentLoopState, Authorization, Confirmations, Message, TerminationReason, ToolCall,
    ToolDefinition, ToolError, ToolResult, authorize,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ports::model_gateway::{
    ChatRequest, GatewayError, ModelGateway, ModelTurn, StreamEvent, Usage,
};
use crate::ports::session_store::{SessionStore, StoreError};
use crate::ports::tool_executor::ToolExecutorPort;
use crate::session_manager::{SessionError, SessionManager};

/// Assistant notice synthesized when the tool-turn limit is exhausted.
pub const TURN_LIMIT_NOTICE: &str = "I reached the tool-use turn limit before completing the \
     task. The work above is partial; ask again with a narrower request to continue.";

/// Errors that end the loop without a normal completion.
#[derive(Error, Debug)]
pub enum RunLoopError {
    /// Another request currently holds this session.
    #[error("Session '{0}' is busy")]
    SessionBusy(String),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Backend error: {0}")]
    Backend(#[from] GatewayError),

    #[error("Request cancelled")]
    Cancelled,
}

impl From<SessionError> for RunLoopError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Busy(id) => RunLoopError::SessionBusy(id),
            // A CAS conflict means a concurrent writer raced us on the
            // same session, which the exclusivity policy reports as busy.
            SessionError::Store(StoreError::Conflict(id)) => RunLoopError::SessionBusy(id),
            SessionError::Store(e) => RunLoopError::Store(e),
        }
    }
}

/// Input for one loop run. Messages are already translated to the domain
/// model; `tools` may be empty to advertise the built-in registry.
#[derive(Debug, Clone)]
pub struct LoopRequest {
    pub session_id: String,
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub confirmations: Confirmations,
}

/// Result of a completed loop run.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub session_id: String,
    /// The final assistant message (the model's answer, or the
    /// synthesized turn-limit notice).
    pub message: Message,
    pub termination: TerminationReason,
    pub usage: Usage,
    /// Tool turns consumed.
    pub turns: u32,
}

/// Progress events emitted during a streaming run.
#[derive(Debug, Clone)]
pub enum LoopEvent {
    /// A text chunk from the model, in generation order.
    Delta(String),
    ToolCallStarted { id: String, name: String },
    ToolCallFinished { id: String, ok: bool },
    /// Terminal: the loop finished normally.
    Completed(Box<LoopOutcome>),
    /// Terminal: the loop failed.
    Failed(String),
}

/// Orchestrates the agent loop over the injected ports.
pub struct RunLoopUseCase<G, T, S>
where
    G: ModelGateway + 'static,
    T: ToolExecutorPort + 'static,
    S: SessionStore + 'static,
{
    gateway: Arc<G>,
    tools: Arc<T>,
    sessions: Arc<SessionManager<S>>,
    max_turns: u32,
    require_confirmation: bool,
    cancellation_token: Option<CancellationToken>,
}

impl<G, T, S> RunLoopUseCase<G, T, S>
where
    G: ModelGateway + 'static,
    T: ToolExecutorPort + 'static,
    S: SessionStore + 'static,
{
    pub fn new(
        gateway: Arc<G>,
        tools: Arc<T>,
        sessions: Arc<SessionManager<S>>,
        max_turns: u32,
        require_confirmation: bool,
    ) -> Self {
        Self {
            gateway,
            tools,
            sessions,
            max_turns,
            require_confirmation,
            cancellation_token: None,
        }
    }

    /// Set a cancellation token for client-disconnect propagation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Run the loop to completion, returning the final outcome.
    pub async fn execute(&self, request: LoopRequest) -> Result<LoopOutcome, RunLoopError> {
        self.run(request, None).await
    }

    /// Run the loop, emitting [`LoopEvent`]s as model deltas arrive and
    /// tools execute. A terminal `Completed` or `Failed` event is always
    /// sent before returning.
    pub async fn execute_streaming(
        &self,
        request: LoopRequest,
        events: mpsc::Sender<LoopEvent>,
    ) -> Result<LoopOutcome, RunLoopError> {
        match self.run(request, Some(&events)).await {
            Ok(outcome) => {
                let _ = events
                    .send(LoopEvent::Completed(Box::new(outcome.clone())))
                    .await;
                Ok(outcome)
            }
            Err(e) => {
                let _ = events.send(LoopEvent::Failed(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: LoopRequest,
        events: Option<&mpsc::Sender<LoopEvent>>,
    ) -> Result<LoopOutcome, RunLoopError> {
        let tools = if request.tools.is_empty() {
            self.tools.definitions()
        } else {
            request.tools
        };

        let mut guard = self
            .sessions
            .acquire(&request.session_id, request.messages)
            .await?;
        let mut state = AgentLoopState::new(self.max_turns);
        let mut usage = Usage::default();

        let (message, termination) = loop {
            if self.is_cancelled() {
                state.finish(TerminationReason::Cancelled);
                self.sessions.commit_best_effort(&mut guard).await;
                return Err(RunLoopError::Cancelled);
            }

            state.await_model();
            let chat = ChatRequest {
                model: request.model.clone(),
                messages: self.sessions.export_for_model(&guard),
                tools: tools.clone(),
            };
            let turn = match self.race_cancellation(self.call_model(&chat, events)).await {
                Ok(Ok(turn)) => turn,
                Ok(Err(e)) => {
                    warn!(session_id = guard.id(), error = %e, "Backend failed, finishing loop");
                    state.finish(TerminationReason::BackendError);
                    self.sessions.commit_best_effort(&mut guard).await;
                    return Err(e.into());
                }
                Err(cancelled) => {
                    info!(session_id = guard.id(), "Cancelled while awaiting the model");
                    state.finish(TerminationReason::Cancelled);
                    self.sessions.commit_best_effort(&mut guard).await;
                    return Err(cancelled);
                }
            };
            usage.accumulate(turn.usage);
            state.interpret_output();
            guard.session.append(turn.message.clone());

            if !turn.message.has_tool_calls() {
                state.finish(TerminationReason::Completed);
                break (turn.message, TerminationReason::Completed);
            }

            if !state.begin_tool_turn() {
                info!(
                    session_id = guard.id(),
                    max_turns = self.max_turns,
                    "Turn limit exhausted"
                );
                // The model still asked for tools; answer every pending
                // call so the history stays consistent, then notify.
                for call in &turn.message.tool_calls {
                    let result = ToolResult::failure(
                        &call.id,
                        &call.name,
                        ToolError::execution_failed("tool-use turn limit reached"),
                    );
                    guard
                        .session
                        .append(Message::tool(&result.call_id, result.to_message_content()));
                }
                let notice = Message::assistant(TURN_LIMIT_NOTICE);
                guard.session.append(notice.clone());
                state.finish(TerminationReason::TurnLimitExceeded);
                break (notice, TerminationReason::TurnLimitExceeded);
            }

            debug!(
                session_id = guard.id(),
                turn = state.turn(),
                calls = turn.message.tool_calls.len(),
                "Executing tool turn"
            );
            let dispatch =
                self.execute_calls(&turn.message.tool_calls, &request.confirmations, events);
            let results = match self.race_cancellation(dispatch).await {
                Ok(results) => results,
                Err(cancelled) => {
                    info!(session_id = guard.id(), "Cancelled during tool execution");
                    // Dropping the dispatch future tears the tools down
                    // (subprocesses die with their futures). Answer every
                    // pending call so the persisted history stays
                    // consistent, then bail out.
                    for call in &turn.message.tool_calls {
                        let result = ToolResult::failure(
                            &call.id,
                            &call.name,
                            ToolError::execution_failed("request cancelled"),
                        );
                        guard
                            .session
                            .append(Message::tool(&result.call_id, result.to_message_content()));
                    }
                    state.finish(TerminationReason::Cancelled);
                    self.sessions.commit_best_effort(&mut guard).await;
                    return Err(cancelled);
                }
            };

            // Join results to calls by id; append in call order so the
            // history is deterministic even though execution was not.
            for call in &turn.message.tool_calls {
                if let Some(result) = results.iter().find(|r| r.call_id == call.id) {
                    guard
                        .session
                        .append(Message::tool(&result.call_id, result.to_message_content()));
                }
            }
        };

        state.done();
        self.sessions.commit(&mut guard).await?;

        Ok(LoopOutcome {
            session_id: guard.id().to_string(),
            message,
            termination,
            usage,
            turns: state.turn(),
        })
    }

    /// One model turn, streaming deltas when a channel is present.
    /// Transient failures get one retry on the non-streaming path only;
    /// a stream that already emitted deltas cannot be replayed.
    async fn call_model(
        &self,
        request: &ChatRequest,
        events: Option<&mpsc::Sender<LoopEvent>>,
    ) -> Result<ModelTurn, GatewayError> {
        match self.call_model_once(request, events).await {
            Err(e) if e.is_transient() && events.is_none() => {
                warn!(error = %e, "Transient backend error, retrying once");
                self.call_model_once(request, None).await
            }
            other => other,
        }
    }

    async fn call_model_once(
        &self,
        request: &ChatRequest,
        events: Option<&mpsc::Sender<LoopEvent>>,
    ) -> Result<ModelTurn, GatewayError> {
        let Some(tx) = events else {
            return self.gateway.chat(request.clone()).await;
        };

        let mut stream = self.gateway.chat_stream(request.clone()).await?;
        while let Some(event) = stream.receiver.recv().await {
            match event {
                StreamEvent::Delta(chunk) => {
                    let _ = tx.send(LoopEvent::Delta(chunk)).await;
                }
                StreamEvent::Completed(turn) => return Ok(turn),
                StreamEvent::Error(e) => return Err(GatewayError::RequestFailed(e)),
            }
        }
        Err(GatewayError::InvalidResponse(
            "stream closed before completion".to_string(),
        ))
    }

    /// Gate every call, then dispatch the allowed ones concurrently.
    /// Calls with overlapping paths are not serialized; ordering between
    /// them is undefined and results are joined by id, never position.
    async fn execute_calls(
        &self,
        calls: &[ToolCall],
        confirmations: &Confirmations,
        events: Option<&mpsc::Sender<LoopEvent>>,
    ) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        let mut allowed: Vec<&ToolCall> = Vec::new();

        for call in calls {
            let definition = self.tools.definition(&call.name);
            match authorize(
                definition.as_ref(),
                call,
                confirmations,
                self.require_confirmation,
            ) {
                Authorization::Allow => allowed.push(call),
                Authorization::RequireConfirmation => {
                    info!(tool = %call.name, call_id = %call.id, "Confirmation required");
                    results.push(ToolResult::failure(
                        &call.id,
                        &call.name,
                        ToolError::permission_required(&call.name),
                    ));
                }
                Authorization::Deny(err) => {
                    info!(tool = %call.name, call_id = %call.id, kind = ?err.kind, "Call denied");
                    results.push(ToolResult::failure(&call.id, &call.name, err));
                }
            }
        }

        if let Some(tx) = events {
            for call in &allowed {
                let _ = tx
                    .send(LoopEvent::ToolCallStarted {
                        id: call.id.clone(),
                        name: call.name.clone(),
                    })
                    .await;
            }
        }

        let executed = join_all(allowed.iter().map(|call| self.tools.execute(call))).await;

        if let Some(tx) = events {
            for result in &executed {
                let _ = tx
                    .send(LoopEvent::ToolCallFinished {
                        id: result.call_id.clone(),
                        ok: result.is_ok(),
                    })
                    .await;
            }
        }

        results.extend(executed);
        results
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation_token
            .as_ref()
            .is_some_and(|t| t.is_cancelled())
    }

    /// Race a suspension point against the cancellation token so a client
    /// disconnect interrupts in-flight work instead of waiting it out.
    async fn race_cancellation<F, R>(&self, fut: F) -> Result<R, RunLoopError>
    where
        F: Future<Output = R>,
    {
        match &self.cancellation_token {
            None => Ok(fut.await),
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(RunLoopError::Cancelled),
                out = fut => Ok(out),
            },
        }
    }
}
