//! Application layer for agent-proxy
//!
//! Ports (traits the infrastructure implements), the session manager, and
//! the agent loop orchestrator use case. This crate depends only on the
//! domain layer; adapters are injected at the composition root.

pub mod ports;
pub mod session_manager;
pub mod use_cases;

pub use ports::model_gateway::{ChatRequest, GatewayError, ModelGateway, ModelTurn, StreamEvent, TurnStream, Usage};
pub use ports::session_store::{SessionStore, StoreError, StoredSession};
pub use ports::tool_executor::ToolExecutorPort;
pub use session_manager::{SessionError, SessionGuard, SessionManager};
pub use use_cases::run_loop::{LoopEvent, LoopOutcome, LoopRequest, RunLoopError, RunLoopUseCase};
