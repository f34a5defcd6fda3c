use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autoforge_core::{EpicId, ProjectId, WorkStatus};

/// Belongs to a Project; status is a derived view over child Tasks
/// (invariant 3), never written directly except through task cascades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    pub id: EpicId,
    pub project_id: ProjectId,
    pub ordinal: i64,
    pub title: String,
    pub description: String,
    pub status: WorkStatus,
    pub created_at: DateTime<Utc>,
}
