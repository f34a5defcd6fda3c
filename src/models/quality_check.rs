use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autoforge_core::{QualityCheckId, QualityCheckKind, SessionId};
use autoforge_quality_gates::Issue;

/// Belongs to a Session. At most one `quick` row and at most one `deep` row
/// per session (invariant 6, enforced by the Task Store's upsert-by-kind).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityCheck {
    pub id: QualityCheckId,
    pub session_id: SessionId,
    pub check_type: QualityCheckKind,
    /// The quick path always produces `Some`. A `deep` check whose review
    /// text carries no extractable numeric rating falls back to the
    /// session's quick rating rather than storing `null` (spec §4.8 "if
    /// unparseable, the quick rating is reused"); `None` here means even
    /// that fallback had nothing to reuse (no quick check recorded yet).
    pub rating: Option<u8>,
    pub tool_uses: i64,
    pub errors: i64,
    pub browser_verifications: i64,
    pub critical_issues: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub review_text: Option<String>,
    pub created_at: DateTime<Utc>,
}
