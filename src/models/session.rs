use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autoforge_core::{ProjectId, SessionId, SessionKind, SessionStatus, TokenUsage};

/// One bounded invocation of the external agent against a project
/// (spec §3). `session_number` is dense and monotone per project
/// (invariant 1); once terminal the row is immutable except for
/// QualityCheck attachment (invariant 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub project_id: ProjectId,
    pub session_number: i64,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub tool_uses: i64,
    pub errors: i64,
    pub tokens: TokenUsage,
    /// Free-form metrics bag (spec §3 "free-form metrics bag").
    pub metrics: serde_json::Value,
}
