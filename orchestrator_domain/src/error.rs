//! # Orchestrator Error Taxonomy
//!
//! `OrchestratorError` is the single error type crossing every seam in the
//! system: domain validation, worker command dispatch, supervisor command
//! routing, and the CLI surface. It carries exactly the five wire-visible
//! kinds the protocol defines and nothing else — every error that reaches
//! a client or a log line can be classified into one of them.
//!
//! `category()` drives both wire serialization (`error_type` field on a
//! response envelope) and Prometheus error-rate labels, so it must stay a
//! small, stable set of `&'static str`s.

use thiserror::Error;

/// The five kinds of error the wire protocol and the logs ever surface.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Descriptor parsing, command deserialization, missing/mistyped fields.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Unknown pipeline_id, missing model artifact, missing file.
    #[error("not found: {0}")]
    NotFound(String),

    /// Upstream API key rejection.
    #[error("authorisation error: {0}")]
    AuthorisationError(String),

    /// Lock-contention timeout, queue-put timeout, response-read timeout,
    /// pipeline marked for removal, slow response dropped.
    #[error("operation error: {0}")]
    OperationError(String),

    /// Catch-all for programmer errors. Always carries a stable, user-safe
    /// message; the originating cause (if any) is logged server-side, never
    /// serialized to a client.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl OrchestratorError {
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn authorisation_error(msg: impl Into<String>) -> Self {
        Self::AuthorisationError(msg.into())
    }

    pub fn operation_error(msg: impl Into<String>) -> Self {
        Self::OperationError(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Stable wire/log category tag. Used for the response envelope's
    /// `error_type` field and as a Prometheus label value — never change
    /// these strings without a wire-compatibility review.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AuthorisationError(_) => "AUTHORISATION_ERROR",
            Self::OperationError(_) => "OPERATION_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Alias kept for readability at call sites that build wire envelopes.
    pub fn error_type(&self) -> &'static str {
        self.category()
    }

    /// The message that is safe to hand to a client or print on stdout.
    /// For `InternalError` this is deliberately generic; callers that need
    /// the full cause for a log line should format the error with `{:?}`
    /// or capture it before converting to `OrchestratorError`.
    pub fn public_error_message(&self) -> String {
        self.to_string()
    }

    /// Whether retrying the same command might succeed (used by the
    /// supervisor's command-routing retry loop).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OperationError(_))
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(e: std::io::Error) -> Self {
        Self::InternalError(format!("io error: {e}"))
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidPayload(format!("json error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        assert_eq!(OrchestratorError::invalid_payload("x").category(), "INVALID_PAYLOAD");
        assert_eq!(OrchestratorError::not_found("x").category(), "NOT_FOUND");
        assert_eq!(OrchestratorError::authorisation_error("x").category(), "AUTHORISATION_ERROR");
        assert_eq!(OrchestratorError::operation_error("x").category(), "OPERATION_ERROR");
        assert_eq!(OrchestratorError::internal_error("x").category(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_operation_error_is_recoverable() {
        assert!(OrchestratorError::operation_error("timeout").is_recoverable());
        assert!(!OrchestratorError::internal_error("bug").is_recoverable());
        assert!(!OrchestratorError::not_found("x").is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: OrchestratorError = io_err.into();
        assert_eq!(err.category(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: OrchestratorError = json_err.into();
        assert_eq!(err.category(), "INVALID_PAYLOAD");
    }
}
