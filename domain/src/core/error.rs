//! Request-level error taxonomy
//!
//! These are the failures that surface to the HTTP client directly.
//! Tool-invocation failures are *not* here — they are recovered inside the
//! agent loop as [`ToolResult`](crate::tool::value_objects::ToolResult)
//! errors and fed back to the model.

use thiserror::Error;

/// Errors that terminate a client request rather than a single tool call.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The request body is unusable: not a JSON object, or missing the
    /// required `messages` / `model` fields.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The requested model is not in the configured supported set.
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    /// Another request currently holds the same session.
    #[error("Session is busy: {0}")]
    SessionBusy(String),

    /// The backend model server is unreachable or returned an invalid shape.
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Too many requests in the current rate-limit window.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The client disconnected or the request was cancelled.
    #[error("Request cancelled")]
    Cancelled,
}

impl ProxyError {
    /// Machine-readable error code used in structured error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::MalformedRequest(_) => "malformed_request",
            ProxyError::UnsupportedModel(_) => "unsupported_model",
            ProxyError::SessionBusy(_) => "session_busy",
            ProxyError::BackendError(_) => "backend_error",
            ProxyError::RateLimited => "rate_limited",
            ProxyError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProxyError::MalformedRequest("missing 'messages'".to_string());
        assert_eq!(err.to_string(), "Malformed request: missing 'messages'");
        assert_eq!(err.code(), "malformed_request");
    }

    #[test]
    fn test_session_busy_code() {
        assert_eq!(
            ProxyError::SessionBusy("sess-1".to_string()).code(),
            "session_busy"
        );
    }
}
