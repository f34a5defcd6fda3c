//! Data types for the quick quality-review path (spec §4.8, §6).

use serde::{Deserialize, Serialize};

/// One parsed line of a session's structured event log (spec §6).
///
/// This mirrors the wire shape of the log artifact rather than the
/// in-process `autoforge_core::SessionEvent`: the Quality Analyzer is
/// specified to run against the on-disk artifact, independently of a live
/// session, so it re-parses JSON rather than sharing Rust enum variants
/// with the Event Log Sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub event: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub is_error: Option<bool>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub subtype: Option<String>,
    /// Structured tool input, when present — used to find which task a
    /// browser-automation or `update_test_result` call targeted.
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    #[serde(default)]
    pub tool_use_count: Option<u64>,
    #[serde(default)]
    pub error_count: Option<u64>,
}

impl LogRecord {
    pub fn task_id(&self) -> Option<&str> {
        self.input
            .as_ref()
            .and_then(|v| v.get("task_id"))
            .and_then(|v| v.as_str())
    }

    pub fn is_browser_tool(&self) -> bool {
        self.tool_name
            .as_deref()
            .map(crate::quick::is_browser_tool_name)
            .unwrap_or(false)
    }

    pub fn is_screenshot_tool(&self) -> bool {
        matches!(self.tool_name.as_deref(), Some("screenshot"))
    }

    pub fn is_passing_test_update(&self) -> bool {
        self.tool_name.as_deref() == Some("update_test_result")
            && self
                .input
                .as_ref()
                .and_then(|v| v.get("outcome"))
                .and_then(|v| v.as_str())
                == Some("pass")
    }
}

/// A structured tag + human message, used for both critical issues and
/// warnings (spec §4.8 "a list of `critical_issues` and `warnings` (each a
/// structured tag + human message)").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub tag: String,
    pub message: String,
}

impl Issue {
    pub fn new(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            message: message.into(),
        }
    }
}

/// Result of the quick (zero-external-call) review path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickReviewResult {
    pub rating: u8,
    pub tool_uses: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub browser_automation_calls: u64,
    pub screenshot_calls: u64,
    pub has_verification_before_completion: bool,
    pub critical_issues: Vec<Issue>,
    pub warnings: Vec<Issue>,
}
