//! Capability traits at the seams between components.
//!
//! The orchestrator (C7) and Tool Bridge (C5) depend only on these traits,
//! never on a concrete sandbox backend (spec §9 "Polymorphic sandbox":
//! "the orchestrator depends only on the capability set").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::AppResult;
use crate::ids::ProjectId;
use crate::model::SandboxPolicy;

/// Lifecycle state of a per-project sandbox (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxLifecycle {
    NotCreated,
    Starting,
    Ready,
    Stopping,
    Gone,
}

/// Result of one `exec` call inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Whether to leave the sandbox running for reuse on orderly session end,
/// or stop-and-remove it (spec §4.4 `stop(policy)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    LeaveRunning,
    RemoveNow,
}

/// The capability set every sandbox backend exposes (spec §4.4, §9).
///
/// `start` is idempotent: calling it on an already-ready sandbox adopts the
/// existing one. At most one live sandbox exists per project id; the
/// implementation is responsible for enforcing that invariant.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Ensure a ready sandbox exists for `project`, creating one if needed.
    ///
    /// `workspace_path` is bind-mounted to a canonical in-sandbox path;
    /// `policy` supplies the image, resource caps, and runtimes to
    /// pre-install. Both are ignored when adopting an already-ready
    /// sandbox, since the existing container was provisioned from whatever
    /// policy was active on its own first `start`.
    async fn start(
        &self,
        project: ProjectId,
        workspace_path: &Path,
        policy: &SandboxPolicy,
    ) -> AppResult<SandboxLifecycle>;

    /// Run `command` inside the ready sandbox, enforcing `timeout`.
    async fn exec(
        &self,
        project: ProjectId,
        command: &str,
        timeout: Duration,
    ) -> AppResult<ExecOutcome>;

    /// Stop the sandbox per `policy`. Does not destroy the workspace bind
    /// mount.
    async fn stop(&self, project: ProjectId, policy: StopPolicy) -> AppResult<()>;

    /// Stop and remove unconditionally; used on project deletion or startup
    /// reconciliation when policy changed.
    async fn destroy(&self, project: ProjectId) -> AppResult<()>;

    /// Current lifecycle state, without side effects.
    async fn health(&self, project: ProjectId) -> AppResult<SandboxLifecycle>;
}
