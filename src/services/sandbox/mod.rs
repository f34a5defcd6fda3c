//! Sandbox provisioning helper (spec §4.4, §7 "sandbox_unavailable retries
//! start once").
//!
//! The orchestrator talks to `dyn Sandbox` directly for `exec`/`stop`/
//! `health`; this module only wraps the one operation with a retry policy,
//! so that policy doesn't get duplicated at every call site.

use std::path::Path;
use std::sync::Arc;

use autoforge_core::{AppResult, Sandbox, SandboxPolicy};

/// Build the process-wide sandbox backend from configuration.
pub fn build_sandbox_manager(runtime_bin: &str) -> Arc<dyn Sandbox> {
    Arc::new(autoforge_sandbox::SandboxManager::new(runtime_bin))
}

/// Ensure a ready sandbox for `project`, retrying once on
/// `sandbox_unavailable` (spec §7). Any other error, or a second failure,
/// propagates.
pub async fn provision(
    sandbox: &dyn Sandbox,
    project: autoforge_core::ProjectId,
    workspace_path: &Path,
    policy: &SandboxPolicy,
) -> AppResult<()> {
    match sandbox.start(project, workspace_path, policy).await {
        Ok(_) => Ok(()),
        Err(first_err) if matches!(first_err, autoforge_core::AppError::SandboxUnavailable(_)) => {
            tracing::warn!(%project, error = %first_err, "sandbox start failed, retrying once");
            sandbox.start(project, workspace_path, policy).await.map(|_| ())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoforge_core::SandboxKind;

    #[tokio::test]
    async fn provision_succeeds_on_none_policy() {
        let sandbox = build_sandbox_manager("docker");
        let project = autoforge_core::ProjectId::new();
        let dir = tempfile::tempdir().unwrap();
        let policy = SandboxPolicy {
            kind: SandboxKind::None,
            ..SandboxPolicy::default()
        };
        provision(sandbox.as_ref(), project, dir.path(), &policy)
            .await
            .unwrap();
        assert_eq!(
            sandbox.health(project).await.unwrap(),
            autoforge_core::SandboxLifecycle::Ready
        );
    }
}
