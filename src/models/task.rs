use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autoforge_core::{EpicId, TaskId, WorkStatus};

/// Belongs to an Epic; `done` only when every child Test is `pass`
/// (invariant 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub epic_id: EpicId,
    pub ordinal: i64,
    pub title: String,
    pub description: String,
    pub status: WorkStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
