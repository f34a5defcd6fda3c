//! Event Log Sink (C1, spec §4.1, §6 "Structured event record").
//!
//! Per session, opens two append-only artifacts: a structured JSONL stream
//! (one self-describing [`SessionEvent`] per line) and a human-readable
//! narrative. fsync happens only on close, so a crash mid-session yields a
//! truncated-but-valid prefix rather than corrupting the artifact.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use autoforge_core::{AppError, AppResult, CounterSnapshot, SessionEvent, SessionEventKind, SessionKind};
use tokio::sync::broadcast;

use crate::utils::paths::{ensure_dir, logs_dir, session_log_jsonl, session_log_txt};

const BROADCAST_CAPACITY: usize = 256;

fn narrative_line(event: &SessionEvent) -> String {
    let ts = event.ts.to_rfc3339();
    match &event.kind {
        SessionEventKind::SessionStart { kind, model } => {
            format!("[{ts}] SESSION START kind={kind} model={model}")
        }
        SessionEventKind::AssistantText { content } => format!("[{ts}] ASSISTANT: {content}"),
        SessionEventKind::ToolUse { tool_name, input_summary } => {
            format!("[{ts}] TOOL_USE {tool_name}: {input_summary}")
        }
        SessionEventKind::ToolResult { tool_name, content, is_error, duration_ms } => format!(
            "[{ts}] TOOL_RESULT {tool_name} ({duration_ms}ms){}: {content}",
            if *is_error { " ERROR" } else { "" }
        ),
        SessionEventKind::Error { kind, message } => format!("[{ts}] ERROR [{kind}]: {message}"),
        SessionEventKind::SystemNotice { subtype, detail } => {
            format!("[{ts}] NOTICE [{subtype}]: {detail}")
        }
        SessionEventKind::CompactionBoundary => format!("[{ts}] --- compaction boundary ---"),
        SessionEventKind::SessionEnd { duration_seconds, tool_use_count, error_count, .. } => format!(
            "[{ts}] SESSION END duration={duration_seconds:.1}s tool_uses={tool_use_count} errors={error_count}"
        ),
    }
}

/// Owns the two on-disk artifacts for one session and a live broadcast
/// channel observers can subscribe to (SPEC_FULL §2, "Observer event
/// tailing").
pub struct EventLogSink {
    jsonl: File,
    narrative: File,
    counters: CounterSnapshot,
    tx: broadcast::Sender<SessionEvent>,
}

impl EventLogSink {
    pub fn open(
        workspace: &PathBuf,
        session_number: i64,
        kind: SessionKind,
    ) -> AppResult<Self> {
        ensure_dir(&logs_dir(workspace))?;
        let jsonl = OpenOptions::new()
            .create(true)
            .append(true)
            .open(session_log_jsonl(workspace, session_number, kind))?;
        let narrative = OpenOptions::new()
            .create(true)
            .append(true)
            .open(session_log_txt(workspace, session_number, kind))?;
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Ok(Self {
            jsonl,
            narrative,
            counters: CounterSnapshot::default(),
            tx,
        })
    }

    /// Subscribe to this session's live event stream (in-process observers
    /// only; no persistence beyond the broadcast buffer).
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn counters(&self) -> &CounterSnapshot {
        &self.counters
    }

    /// Appends one event to both artifacts, updates running counters, and
    /// notifies live subscribers. Events are never mutated once written.
    pub fn append(&mut self, event: SessionEvent) -> AppResult<()> {
        let line = serde_json::to_string(&event)?;
        writeln!(self.jsonl, "{line}")?;
        writeln!(self.narrative, "{}", narrative_line(&event))?;
        self.counters.record(&event);
        let _ = self.tx.send(event);
        Ok(())
    }

    /// fsync both artifacts. Called once, at session end.
    pub fn close(self) -> AppResult<()> {
        self.jsonl
            .sync_all()
            .map_err(|e| AppError::internal(format!("failed to fsync jsonl log: {e}")))?;
        self.narrative
            .sync_all()
            .map_err(|e| AppError::internal(format!("failed to fsync narrative log: {e}")))?;
        Ok(())
    }
}
