//! Agent Driver (C6, spec §4.6 "Streaming agent output").
//!
//! Spawns the external coding agent as a subprocess, translates its
//! stream-json stdout into [`SessionEvent`]s via [`protocol::AgentWireAdapter`],
//! and dispatches its `tool_use` requests to a [`ToolBridge`], writing the
//! tool's result back over the process's stdin so the external agent's
//! single-shot protocol can continue.

pub mod prompts;
pub mod protocol;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use autoforge_core::{
    AppError, AppResult, SandboxKind, SessionEvent, SessionEventKind, SessionKind, SessionStatus, TokenUsage,
};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::services::log_sink::EventLogSink;
use crate::services::tool_bridge::ToolBridge;
use protocol::{AgentWireAdapter, ParsedLine};

/// What to run and where.
pub struct AgentRequest {
    pub workspace_path: PathBuf,
    pub session_kind: SessionKind,
    pub sandbox_kind: SandboxKind,
    pub model: String,
    /// Present when this session continues a prior agent conversation.
    pub resume_session_id: Option<String>,
    /// A prior session's raw log, appended to the opening prompt for
    /// review-kind invocations (spec §4.8 "fed the session's raw log
    /// artifact"). Unused for initializer/coding sessions.
    pub transcript: Option<String>,
}

/// Terminal result of one driven session, handed back to the orchestrator
/// to decide on auto-chain / retry (spec §4.7).
pub struct SessionOutcome {
    pub status: SessionStatus,
    pub duration_seconds: f64,
    pub tool_use_count: u64,
    pub error_count: u64,
    pub tokens: TokenUsage,
    /// Concatenated `assistant_text` events, in order. The review prompt
    /// instructs the agent to emit its rating and reasoning as assistant
    /// text, so this is the deep review's `review_text` (spec §4.8).
    pub collected_text: String,
    /// Number of events processed before the stream ended, used by the
    /// orchestrator's `agent_transport` retry rule (spec §7 "if within the
    /// first 10 events, the session is retried at most once").
    pub event_count: u64,
    /// Set when `status` is `Failed` because of a transport-level error,
    /// as opposed to an agent-reported one; distinguishes the retriable
    /// case from a session the agent itself gave up on.
    pub failure_kind: Option<&'static str>,
}

enum LineOutcome {
    Line(String),
    Overflow,
}

/// Reads one line from `reader`, bounded by `cap` bytes. A line exceeding
/// the cap is fully drained (so the stream stays in sync) but reported as
/// [`LineOutcome::Overflow`] rather than allocated in full.
async fn read_bounded_line<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    cap: usize,
) -> std::io::Result<Option<LineOutcome>> {
    let mut buf = Vec::new();
    let mut overflowed = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(if buf.is_empty() && !overflowed {
                None
            } else if overflowed {
                Some(LineOutcome::Overflow)
            } else {
                Some(LineOutcome::Line(String::from_utf8_lossy(&buf).into_owned()))
            });
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            if !overflowed {
                buf.extend_from_slice(&available[..pos]);
            }
            let consume_len = pos + 1;
            reader.consume(consume_len);
            return Ok(Some(if overflowed {
                LineOutcome::Overflow
            } else {
                LineOutcome::Line(String::from_utf8_lossy(&buf).into_owned())
            }));
        }
        if !overflowed && buf.len() + available.len() > cap {
            overflowed = true;
        } else if !overflowed {
            buf.extend_from_slice(available);
        }
        let consume_len = available.len();
        reader.consume(consume_len);
    }
}

#[derive(Clone)]
pub struct AgentDriver {
    agent_bin: String,
    auth_token: String,
    buffer_cap_bytes: usize,
}

impl AgentDriver {
    pub fn new(agent_bin: impl Into<String>, auth_token: impl Into<String>, buffer_cap_bytes: usize) -> Self {
        Self {
            agent_bin: agent_bin.into(),
            auth_token: auth_token.into(),
            buffer_cap_bytes,
        }
    }

    fn spawn(&self, request: &AgentRequest) -> AppResult<Child> {
        let mut cmd = Command::new(&self.agent_bin);
        cmd.current_dir(&request.workspace_path);
        cmd.arg("--output-format").arg("stream-json");
        cmd.arg("--model").arg(&request.model);
        if let Some(ref resume) = request.resume_session_id {
            cmd.arg("--resume").arg(resume);
        }
        cmd.env("AUTOFORGE_AGENT_TOKEN", &self.auth_token);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());

        cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::agent_transport(format!("agent binary `{}` not found", self.agent_bin))
            } else {
                AppError::agent_transport(format!("failed to spawn agent process: {e}"))
            }
        })
    }

    /// Drives one session to completion, appending every translated event
    /// to `log` and dispatching tool calls through `tool_bridge`. Never
    /// returns an `Err` for agent-side failures; those are folded into the
    /// returned [`SessionOutcome`] plus a terminal `error`/`session_end`
    /// event already appended to `log` (spec §4.6 "never throw through the
    /// call site").
    pub async fn run(
        &self,
        request: AgentRequest,
        session_id: &str,
        tool_bridge: &ToolBridge,
        log: &tokio::sync::Mutex<EventLogSink>,
        cancel: CancellationToken,
    ) -> AppResult<SessionOutcome> {
        let started = Instant::now();
        let mut child = self.spawn(&request)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::agent_transport("agent process did not expose stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::agent_transport("agent process did not expose stdout"))?;
        let mut reader = BufReader::new(stdout);

        let mut prompt = prompts::compose_prompt(request.session_kind, request.sandbox_kind);
        if let Some(ref transcript) = request.transcript {
            prompt.push_str("\n\n--- SESSION TRANSCRIPT ---\n");
            prompt.push_str(transcript);
        }
        let opening = json!({"type": "user", "content": prompt}).to_string();
        if stdin.write_all(opening.as_bytes()).await.is_ok() {
            let _ = stdin.write_all(b"\n").await;
        }

        let mut adapter = AgentWireAdapter;
        let mut tool_use_count = 0u64;
        let mut error_count = 0u64;
        let mut tokens = TokenUsage::default();
        let mut status = SessionStatus::Completed;
        let mut collected_text = String::new();
        let mut event_count = 0u64;
        let mut failure_kind = None;

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    status = SessionStatus::Cancelled;
                    break;
                }
                line = read_bounded_line(&mut reader, self.buffer_cap_bytes) => line,
            };

            let outcome = match line {
                Ok(Some(outcome)) => outcome,
                Ok(None) => break,
                Err(e) => {
                    status = SessionStatus::Failed;
                    failure_kind = Some("agent_transport");
                    error_count += 1;
                    event_count += 1;
                    let event = SessionEvent::new(
                        session_id,
                        SessionEventKind::Error {
                            kind: "agent_transport".to_string(),
                            message: format!("stdout read failed: {e}"),
                        },
                        chrono::Utc::now(),
                    );
                    let _ = log.lock().await.append(event);
                    break;
                }
            };

            match outcome {
                LineOutcome::Overflow => {
                    error_count += 1;
                    event_count += 1;
                    let event = SessionEvent::new(
                        session_id,
                        SessionEventKind::Error {
                            kind: "agent_transport".to_string(),
                            message: format!("line exceeded {} byte buffer cap", self.buffer_cap_bytes),
                        },
                        chrono::Utc::now(),
                    );
                    log.lock().await.append(event)?;
                }
                LineOutcome::Line(raw) => {
                    if raw.trim().is_empty() {
                        continue;
                    }
                    match protocol::parse_line(&mut adapter, &raw) {
                        Ok(ParsedLine::Other(events)) => {
                            for kind in events {
                                event_count += 1;
                                if matches!(kind, SessionEventKind::Error { .. }) {
                                    error_count += 1;
                                }
                                if let SessionEventKind::AssistantText { ref content } = kind {
                                    if !collected_text.is_empty() {
                                        collected_text.push('\n');
                                    }
                                    collected_text.push_str(content);
                                }
                                let event = SessionEvent::new(session_id, kind, chrono::Utc::now());
                                log.lock().await.append(event)?;
                            }
                        }
                        Ok(ParsedLine::Usage(usage)) => {
                            event_count += 1;
                            tokens = usage;
                        }
                        Ok(ParsedLine::ToolUse { id, name, input }) => {
                            tool_use_count += 1;
                            event_count += 2;
                            let use_event = SessionEvent::new(
                                session_id,
                                SessionEventKind::ToolUse {
                                    tool_name: name.clone(),
                                    input_summary: input.to_string(),
                                },
                                chrono::Utc::now(),
                            );
                            log.lock().await.append(use_event)?;

                            let started_call = Instant::now();
                            let result = tool_bridge.call(&name, &input.to_string()).await;
                            let duration_ms = started_call.elapsed().as_millis() as u64;
                            let (content, is_error) = match &result {
                                Ok(value) => (value.to_string(), false),
                                Err(err) => {
                                    error_count += 1;
                                    (serde_json::to_string(err).unwrap_or_default(), true)
                                }
                            };
                            let result_event = SessionEvent::new(
                                session_id,
                                SessionEventKind::ToolResult {
                                    tool_name: name,
                                    content: content.chars().take(4096).collect(),
                                    is_error,
                                    duration_ms,
                                },
                                chrono::Utc::now(),
                            );
                            log.lock().await.append(result_event)?;

                            let reply = json!({"type": "tool_result", "id": id, "output": content, "is_error": is_error})
                                .to_string();
                            if stdin.write_all(reply.as_bytes()).await.is_ok() {
                                let _ = stdin.write_all(b"\n").await;
                            }
                        }
                        Err(e) => {
                            error_count += 1;
                            event_count += 1;
                            let event = SessionEvent::new(
                                session_id,
                                SessionEventKind::Error {
                                    kind: "agent_transport".to_string(),
                                    message: format!("malformed agent event: {e}"),
                                },
                                chrono::Utc::now(),
                            );
                            log.lock().await.append(event)?;
                        }
                    }
                }
            }
        }

        drop(stdin);
        if matches!(status, SessionStatus::Cancelled) {
            let _ = child.start_kill();
        }
        let _ = child.wait().await;

        let duration_seconds = started.elapsed().as_secs_f64();
        let end_event = SessionEvent::new(
            session_id,
            SessionEventKind::SessionEnd {
                duration_seconds,
                tool_use_count,
                error_count,
                tokens: tokens.clone(),
            },
            chrono::Utc::now(),
        );
        log.lock().await.append(end_event)?;

        Ok(SessionOutcome {
            status,
            duration_seconds,
            tool_use_count,
            error_count,
            tokens,
            collected_text,
            event_count,
            failure_kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader as TokioBufReader;

    #[tokio::test]
    async fn bounded_reader_yields_plain_lines_under_cap() {
        let data = b"hello\nworld\n".to_vec();
        let mut reader = TokioBufReader::new(&data[..]);
        let first = read_bounded_line(&mut reader, 1024).await.unwrap().unwrap();
        assert!(matches!(first, LineOutcome::Line(ref s) if s == "hello"));
        let second = read_bounded_line(&mut reader, 1024).await.unwrap().unwrap();
        assert!(matches!(second, LineOutcome::Line(ref s) if s == "world"));
        assert!(read_bounded_line(&mut reader, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bounded_reader_reports_overflow_without_buffering_whole_line() {
        let mut data = "x".repeat(100).into_bytes();
        data.push(b'\n');
        data.extend_from_slice(b"next\n");
        let mut reader = TokioBufReader::new(&data[..]);
        let first = read_bounded_line(&mut reader, 10).await.unwrap().unwrap();
        assert!(matches!(first, LineOutcome::Overflow));
        let second = read_bounded_line(&mut reader, 10).await.unwrap().unwrap();
        assert!(matches!(second, LineOutcome::Line(ref s) if s == "next"));
    }
}
