//! Ports - interfaces between the application layer and infrastructure
//!
//! The application layer defines these traits; adapters in the
//! infrastructure layer implement them and are injected at startup.

pub mod model_gateway;
pub mod session_store;
pub mod tool_executor;
