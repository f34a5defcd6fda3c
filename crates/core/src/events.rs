//! Session event types (spec §3 "SessionEvent (logical)", §6 "Structured
//! event record"). These are the records the Event Log Sink persists and
//! the unit the Agent Driver's stream yields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token usage reported on a session footer, if the agent reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
}

/// The payload-specific part of a [`SessionEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEventKind {
    /// Session header: kind, model, start time.
    SessionStart { kind: String, model: String },
    /// One assistant message rendered as text.
    AssistantText { content: String },
    /// One tool invocation.
    ToolUse {
        tool_name: String,
        /// Redacted summary of the input (never the raw payload verbatim
        /// if it could carry secrets; redaction happens at the sink).
        input_summary: String,
    },
    /// The result of a tool invocation.
    ToolResult {
        tool_name: String,
        /// Truncated to 4096 bytes per spec §6.
        content: String,
        is_error: bool,
        duration_ms: u64,
    },
    /// A fatal or recoverable error surfaced mid-session.
    Error { kind: String, message: String },
    /// A system notice, e.g. a compaction boundary.
    SystemNotice { subtype: String, detail: String },
    /// Marks that the agent transcript was compacted.
    CompactionBoundary,
    /// Session footer: duration and aggregate counters.
    SessionEnd {
        duration_seconds: f64,
        tool_use_count: u64,
        error_count: u64,
        tokens: TokenUsage,
    },
}

impl SessionEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::AssistantText { .. } => "assistant_text",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Error { .. } => "error",
            Self::SystemNotice { .. } => "system_notice",
            Self::CompactionBoundary => "compaction_boundary",
            Self::SessionEnd { .. } => "session_end",
        }
    }
}

/// One line of the structured event log: a self-describing record with a
/// timestamp and session id, matching the wire shape in spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub ts: DateTime<Utc>,
    pub session_id: String,
    #[serde(flatten)]
    pub kind: SessionEventKind,
}

impl SessionEvent {
    pub fn new(session_id: impl Into<String>, kind: SessionEventKind, ts: DateTime<Utc>) -> Self {
        Self {
            ts,
            session_id: session_id.into(),
            kind,
        }
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self.kind, SessionEventKind::ToolUse { .. })
    }

    pub fn is_error(&self) -> bool {
        match &self.kind {
            SessionEventKind::Error { .. } => true,
            SessionEventKind::ToolResult { is_error, .. } => *is_error,
            _ => false,
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        match &self.kind {
            SessionEventKind::ToolUse { tool_name, .. } => Some(tool_name),
            SessionEventKind::ToolResult { tool_name, .. } => Some(tool_name),
            _ => None,
        }
    }
}

/// Running tallies of a session's events, consumed live by the orchestrator
/// for early-warning checks and post hoc by the Quality Analyzer
/// (spec §4.1 "counter snapshot view").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub tool_uses: u64,
    pub errors: u64,
    pub tool_use_by_name: HashMap<String, u64>,
    pub browser_automation_calls: u64,
}

impl CounterSnapshot {
    /// Tool names treated as browser-automation calls for the purposes of
    /// spec §4.1's "browser-automation call count" and §4.8's
    /// browser-verification rating input.
    pub fn is_browser_tool(tool_name: &str) -> bool {
        tool_name.starts_with("browser_") || tool_name == "navigate" || tool_name == "screenshot"
    }

    pub fn record(&mut self, event: &SessionEvent) {
        match &event.kind {
            SessionEventKind::ToolUse { tool_name, .. } => {
                self.tool_uses += 1;
                *self.tool_use_by_name.entry(tool_name.clone()).or_insert(0) += 1;
                if Self::is_browser_tool(tool_name) {
                    self.browser_automation_calls += 1;
                }
            }
            SessionEventKind::ToolResult { is_error, .. } if *is_error => {
                self.errors += 1;
            }
            SessionEventKind::Error { .. } => {
                self.errors += 1;
            }
            _ => {}
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.tool_uses == 0 {
            0.0
        } else {
            self.errors as f64 / self.tool_uses as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_use(name: &str) -> SessionEvent {
        SessionEvent::new(
            "sess_1",
            SessionEventKind::ToolUse {
                tool_name: name.to_string(),
                input_summary: "{}".to_string(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn counter_snapshot_tracks_tool_uses_and_browser_calls() {
        let mut snapshot = CounterSnapshot::default();
        snapshot.record(&tool_use("exec"));
        snapshot.record(&tool_use("browser_click"));
        assert_eq!(snapshot.tool_uses, 2);
        assert_eq!(snapshot.browser_automation_calls, 1);
        assert_eq!(snapshot.tool_use_by_name.get("exec"), Some(&1));
    }

    #[test]
    fn error_rate_is_zero_with_no_tool_uses() {
        let snapshot = CounterSnapshot::default();
        assert_eq!(snapshot.error_rate(), 0.0);
    }

    #[test]
    fn error_rate_divides_errors_by_tool_uses() {
        let mut snapshot = CounterSnapshot::default();
        snapshot.record(&tool_use("exec"));
        snapshot.record(&tool_use("exec"));
        let mut failing_result = tool_use("exec");
        failing_result.kind = SessionEventKind::ToolResult {
            tool_name: "exec".to_string(),
            content: "boom".to_string(),
            is_error: true,
            duration_ms: 10,
        };
        snapshot.record(&failing_result);
        assert_eq!(snapshot.error_rate(), 0.5);
    }
}
