//! Wire protocol for the external agent process (spec §4.6, §9 "Streaming
//! agent output"). Grounded on the same stream-json shape the teacher's
//! Claude Code adapter parses: one tagged JSON object per line, `type`
//! discriminated, unknown variants swallowed rather than erroring.

use autoforge_core::{AdapterError, SessionEventKind, StreamAdapter, TokenUsage};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawEvent {
    Assistant {
        #[serde(default)]
        content: Option<String>,
    },
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        input: Option<Value>,
    },
    Error {
        message: String,
    },
    SystemNotice {
        subtype: String,
        #[serde(default)]
        detail: Option<String>,
    },
    CompactionBoundary,
    Result {
        #[serde(default)]
        usage: Option<Usage>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
}

impl From<Usage> for TokenUsage {
    fn from(u: Usage) -> Self {
        TokenUsage {
            input: u.input_tokens,
            output: u.output_tokens,
            cache_creation: u.cache_creation_input_tokens,
            cache_read: u.cache_read_input_tokens,
        }
    }
}

/// One parsed raw line, kept separate from the adapted `SessionEventKind`
/// because a `tool_use` line carries the full input payload the Tool
/// Bridge needs, not the redacted summary the log is allowed to carry, and
/// a `result` line carries the session's final token usage rather than a
/// loggable event.
pub enum ParsedLine {
    ToolUse { id: Option<String>, name: String, input: Value },
    Usage(TokenUsage),
    Other(Vec<SessionEventKind>),
}

fn redact_summary(input: &Option<Value>) -> String {
    match input {
        Some(value) => {
            let rendered = value.to_string();
            if rendered.len() > 200 {
                format!("{}…", &rendered[..200])
            } else {
                rendered
            }
        }
        None => "{}".to_string(),
    }
}

/// Parses one raw line, splitting `tool_use` lines out for dispatch while
/// routing everything else through the [`StreamAdapter`] seam.
pub fn parse_line(adapter: &mut dyn StreamAdapter, raw: &str) -> Result<ParsedLine, AdapterError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(ParsedLine::Other(vec![]));
    }

    let event: RawEvent =
        serde_json::from_str(trimmed).map_err(|e| AdapterError::ParseError(e.to_string()))?;

    if let RawEvent::ToolUse { id, name, input } = event {
        return Ok(ParsedLine::ToolUse {
            id,
            name,
            input: input.unwrap_or(Value::Null),
        });
    }
    if let RawEvent::Result { usage } = event {
        return Ok(ParsedLine::Usage(usage.unwrap_or_default().into()));
    }

    // Everything else is pure logging translation; re-run it through the
    // adapter so `reset()`/stateful adapters stay in the loop.
    adapter.adapt(trimmed).map(ParsedLine::Other)
}

/// The concrete [`StreamAdapter`] for the external agent's stream-json
/// wire format.
#[derive(Default)]
pub struct AgentWireAdapter;

impl StreamAdapter for AgentWireAdapter {
    fn protocol_name(&self) -> &'static str {
        "agent-stream-json"
    }

    fn adapt(&mut self, raw: &str) -> Result<Vec<SessionEventKind>, AdapterError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(vec![]);
        }
        let event: RawEvent =
            serde_json::from_str(trimmed).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        Ok(match event {
            RawEvent::Assistant { content } => match content {
                Some(content) if !content.is_empty() => {
                    vec![SessionEventKind::AssistantText { content }]
                }
                _ => vec![],
            },
            RawEvent::ToolUse { name, input, .. } => vec![SessionEventKind::ToolUse {
                tool_name: name,
                input_summary: redact_summary(&input),
            }],
            RawEvent::Error { message } => vec![SessionEventKind::Error {
                kind: "agent_reported".to_string(),
                message,
            }],
            RawEvent::SystemNotice { subtype, detail } => vec![SessionEventKind::SystemNotice {
                subtype,
                detail: detail.unwrap_or_default(),
            }],
            RawEvent::CompactionBoundary => vec![SessionEventKind::CompactionBoundary],
            RawEvent::Result { .. } | RawEvent::Unknown => vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_use_line_is_split_out_for_dispatch() {
        let mut adapter = AgentWireAdapter;
        let line = r#"{"type":"tool_use","id":"1","name":"exec","input":{"command":"ls"}}"#;
        match parse_line(&mut adapter, line).unwrap() {
            ParsedLine::ToolUse { name, input, .. } => {
                assert_eq!(name, "exec");
                assert_eq!(input["command"], "ls");
            }
            ParsedLine::Other(_) => panic!("expected ToolUse"),
        }
    }

    #[test]
    fn assistant_line_becomes_assistant_text_event() {
        let mut adapter = AgentWireAdapter;
        let line = r#"{"type":"assistant","content":"hello"}"#;
        match parse_line(&mut adapter, line).unwrap() {
            ParsedLine::Other(events) => {
                assert!(matches!(events[0], SessionEventKind::AssistantText { .. }));
            }
            _ => panic!("expected Other"),
        }
    }

    #[test]
    fn result_line_surfaces_token_usage() {
        let mut adapter = AgentWireAdapter;
        let line = r#"{"type":"result","usage":{"input_tokens":12,"output_tokens":34,"cache_read_input_tokens":5}}"#;
        match parse_line(&mut adapter, line).unwrap() {
            ParsedLine::Usage(tokens) => {
                assert_eq!(tokens.input, 12);
                assert_eq!(tokens.output, 34);
                assert_eq!(tokens.cache_read, 5);
                assert_eq!(tokens.cache_creation, 0);
            }
            _ => panic!("expected Usage"),
        }
    }

    #[test]
    fn unknown_type_is_swallowed() {
        let mut adapter = AgentWireAdapter;
        let events = adapter.adapt(r#"{"type":"heartbeat"}"#).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn blank_line_is_ignored() {
        let mut adapter = AgentWireAdapter;
        assert!(adapter.adapt("").unwrap().is_empty());
        assert!(adapter.adapt("   ").unwrap().is_empty());
    }
}
