//! Core Error Types
//!
//! The error taxonomy from spec §7, surfaced uniformly as a structured
//! `{kind, message, retriable}` triple wherever it crosses a tool-call
//! boundary (see [`ToolError`]), and as a plain `AppError` everywhere else.

use thiserror::Error;

/// Application-wide error type.
///
/// Variants map directly onto the error taxonomy in the spec: each one
/// carries the propagation policy described there (surfaced to the agent as
/// a tool error, or terminal to the current session) rather than the policy
/// living in call sites.
#[derive(Error, Debug)]
pub enum AppError {
    /// An invariant would be violated by the requested mutation (e.g.
    /// marking a task done while a test is not `pass`).
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller's project scope does not include the referenced entity.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Container runtime unreachable or sandbox failed to start.
    #[error("sandbox unavailable: {0}")]
    SandboxUnavailable(String),

    /// The external agent's event stream aborted or exceeded its buffer.
    #[error("agent transport error: {0}")]
    AgentTransport(String),

    /// An exec call or the whole session exceeded its configured timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A command was blocked by the security gate.
    #[error("security denied: {0}")]
    SecurityDenied(String),

    /// The relational store is unreachable or a query failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Input validation failure (malformed payload, oversized input, etc).
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for errors that don't fit another variant.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the workspace.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn sandbox_unavailable(msg: impl Into<String>) -> Self {
        Self::SandboxUnavailable(msg.into())
    }

    pub fn agent_transport(msg: impl Into<String>) -> Self {
        Self::AgentTransport(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn security_denied(msg: impl Into<String>) -> Self {
        Self::SecurityDenied(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The stable error-kind tag used in [`ToolError`] and in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precondition(_) => "precondition",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::SandboxUnavailable(_) => "sandbox_unavailable",
            Self::AgentTransport(_) => "agent_transport",
            Self::Timeout(_) => "timeout",
            Self::SecurityDenied(_) => "security_denied",
            Self::Storage(_) => "storage",
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the orchestrator should retry the operation that produced
    /// this error, per spec §7 (sandbox_unavailable retries start once,
    /// agent_transport retries within the first 10 events, storage backs
    /// off exponentially).
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            Self::SandboxUnavailable(_) | Self::AgentTransport(_) | Self::Storage(_)
        )
    }
}

impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}

/// Structured error returned to the external agent across the Tool Bridge.
///
/// Never an exception: tool calls that fail return this value so the agent
/// can see `kind` and `message` and decide whether to retry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
    pub retriable: bool,
}

impl From<&AppError> for ToolError {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            retriable: err.retriable(),
        }
    }
}

impl From<AppError> for ToolError {
    fn from(err: AppError) -> Self {
        ToolError::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_error_display() {
        let err = AppError::precondition("task has failing tests");
        assert_eq!(err.to_string(), "precondition failed: task has failing tests");
        assert_eq!(err.kind(), "precondition");
        assert!(!err.retriable());
    }

    #[test]
    fn sandbox_unavailable_is_retriable() {
        let err = AppError::sandbox_unavailable("docker daemon unreachable");
        assert!(err.retriable());
    }

    #[test]
    fn tool_error_conversion_preserves_kind_and_message() {
        let err = AppError::not_found("task tsk_1");
        let tool_err: ToolError = (&err).into();
        assert_eq!(tool_err.kind, "not_found");
        assert_eq!(tool_err.message, err.to_string());
        assert!(!tool_err.retriable);
    }
}
