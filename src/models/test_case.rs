use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autoforge_core::{TaskId, TestId, TestOutcome};

/// Belongs to a Task. Named `TestCase` rather than `Test` to avoid clashing
/// with Rust's own `#[test]` vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: TestId,
    pub task_id: TaskId,
    pub description: String,
    pub outcome: TestOutcome,
    pub verification_note: Option<String>,
    pub created_at: DateTime<Utc>,
}
