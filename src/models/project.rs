use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autoforge_core::{ProjectId, SandboxPolicy};

/// A single code-generation effort: its workspace, sandbox policy, and the
/// prompt versions active for its sessions (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub workspace_path: PathBuf,
    pub spec_path: PathBuf,
    pub sandbox_policy: SandboxPolicy,
    pub initializer_prompt_version: String,
    pub coding_prompt_version: String,
    pub review_prompt_version: String,
    pub created_at: DateTime<Utc>,
}
