//! Stream adaptation types for the Agent Driver (spec §4.6).
//!
//! The external agent is out of scope (spec §1): we only specify the
//! boundary where its output crosses into our event model. `StreamAdapter`
//! is the seam a concrete agent backend implements to turn whatever its
//! wire format is into [`crate::events::SessionEventKind`]s.

use serde::{Deserialize, Serialize};

use crate::events::SessionEventKind;

/// Errors that can occur while adapting one raw chunk from the external
/// agent's transport into our event model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AdapterError {
    InvalidFormat(String),
    ParseError(String),
    UnsupportedEvent(String),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::InvalidFormat(msg) => write!(f, "invalid format: {msg}"),
            AdapterError::ParseError(msg) => write!(f, "parse error: {msg}"),
            AdapterError::UnsupportedEvent(msg) => write!(f, "unsupported event: {msg}"),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Adapts one raw line/chunk from the external agent's transport into zero
/// or more [`SessionEventKind`]s. A single input line may fan out (e.g. a
/// combined tool-use-and-result line) or be swallowed entirely (protocol
/// heartbeats).
///
/// Implemented once per supported external-agent wire protocol; the
/// orchestrator and Tool Bridge never depend on a concrete implementation,
/// only on this trait (spec §9 "Streaming agent output").
pub trait StreamAdapter: Send + Sync {
    /// Name of the wire protocol this adapter understands, for logging.
    fn protocol_name(&self) -> &'static str;

    /// Adapt one raw chunk. Stateful adapters (e.g. ones that accumulate a
    /// partial tool-call across multiple chunks) keep that state on `self`.
    fn adapt(&mut self, raw: &str) -> Result<Vec<SessionEventKind>, AdapterError>;

    /// Reset any accumulated state for a new session.
    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_error_display() {
        assert_eq!(
            AdapterError::ParseError("bad token".into()).to_string(),
            "parse error: bad token"
        );
    }
}
