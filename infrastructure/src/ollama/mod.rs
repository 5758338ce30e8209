//! Ollama backend adapter: wire protocol and gateway.

pub mod gateway;
pub mod protocol;

pub use gateway::OllamaGateway;
