//! Internal per-project sandbox bookkeeping.

use std::path::PathBuf;

use autoforge_core::{SandboxLifecycle, SandboxPolicy};

/// What the manager remembers about one project's sandbox between calls.
/// Not persisted: on process restart this is empty and `start` re-adopts
/// or re-creates based on what the backend reports (spec §4.4 "If a
/// sandbox named `project-<id>` exists and is healthy, adopt it").
#[derive(Debug, Clone)]
pub struct SandboxRecord {
    pub lifecycle: SandboxLifecycle,
    pub container_name: Option<String>,
    pub workspace_path: Option<PathBuf>,
    pub policy: Option<SandboxPolicy>,
    /// Monotonic generation counter: bumped on every `start`, used to let a
    /// newer `start` win a race against an older one (spec §4.4 "On
    /// conflict, the newer `start` wins; the loser aborts").
    pub generation: u64,
}

impl Default for SandboxRecord {
    fn default() -> Self {
        Self {
            lifecycle: SandboxLifecycle::NotCreated,
            container_name: None,
            workspace_path: None,
            policy: None,
            generation: 0,
        }
    }
}
