//! `SandboxManager`: the concrete, polymorphic implementation of the
//! `Sandbox` capability (spec §4.4, §9).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoforge_core::{
    AppError, AppResult, ExecOutcome, ProjectId, Sandbox, SandboxKind, SandboxLifecycle,
    SandboxPolicy, StopPolicy,
};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::container;
use crate::record::SandboxRecord;

/// Manages the lifecycle of one sandbox per project. Holds no global lock:
/// each project gets its own `Mutex<SandboxRecord>` so that concurrent
/// projects never contend with each other (spec §5 "Cross-project
/// operations take no shared locks").
pub struct SandboxManager {
    /// `docker` or `podman`; whichever CLI the deployment has installed.
    runtime_bin: String,
    registry: DashMap<ProjectId, Arc<Mutex<SandboxRecord>>>,
}

impl SandboxManager {
    pub fn new(runtime_bin: impl Into<String>) -> Self {
        Self {
            runtime_bin: runtime_bin.into(),
            registry: DashMap::new(),
        }
    }

    fn entry(&self, project: ProjectId) -> Arc<Mutex<SandboxRecord>> {
        self.registry
            .entry(project)
            .or_insert_with(|| Arc::new(Mutex::new(SandboxRecord::default())))
            .clone()
    }
}

#[async_trait]
impl Sandbox for SandboxManager {
    async fn start(
        &self,
        project: ProjectId,
        workspace_path: &Path,
        policy: &SandboxPolicy,
    ) -> AppResult<SandboxLifecycle> {
        let entry = self.entry(project);
        let mut record = entry.lock().await;
        let my_generation = record.generation + 1;
        record.generation = my_generation;

        match policy.kind {
            SandboxKind::None => {
                record.lifecycle = SandboxLifecycle::Ready;
                record.workspace_path = Some(workspace_path.to_path_buf());
                record.policy = Some(policy.clone());
                return Ok(SandboxLifecycle::Ready);
            }
            SandboxKind::RemoteCloud => {
                return Err(AppError::sandbox_unavailable(
                    "remote_cloud sandbox backend is not implemented",
                ));
            }
            SandboxKind::Container => {}
        }

        record.lifecycle = SandboxLifecycle::Starting;
        let name = container::name_for(&project.to_string());

        if container::is_healthy(&self.runtime_bin, &name).await {
            tracing::info!(container = %name, "adopting existing healthy sandbox");
        } else {
            container::create(&self.runtime_bin, &name, workspace_path, policy).await?;
        }

        // A newer start for this project may have already won the race
        // while we were provisioning; if so, abort as the loser rather
        // than clobbering state the newer start already wrote.
        if record.generation != my_generation {
            return Err(AppError::sandbox_unavailable(format!(
                "superseded by a newer start for project {project}"
            )));
        }

        record.lifecycle = SandboxLifecycle::Ready;
        record.container_name = Some(name);
        record.workspace_path = Some(workspace_path.to_path_buf());
        record.policy = Some(policy.clone());

        Ok(SandboxLifecycle::Ready)
    }

    async fn exec(
        &self,
        project: ProjectId,
        command: &str,
        timeout: Duration,
    ) -> AppResult<ExecOutcome> {
        let entry = self.entry(project);
        let record = entry.lock().await;

        if record.lifecycle != SandboxLifecycle::Ready {
            return Err(AppError::sandbox_unavailable(format!(
                "sandbox for project {project} is not ready ({:?})",
                record.lifecycle
            )));
        }

        match record.policy.as_ref().map(|p| p.kind) {
            Some(SandboxKind::None) => {
                let cwd = record
                    .workspace_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("."));
                crate::none::exec(command, &cwd, timeout).await
            }
            Some(SandboxKind::Container) => {
                let name = record
                    .container_name
                    .clone()
                    .ok_or_else(|| AppError::sandbox_unavailable("no container name recorded"))?;
                container::exec(&self.runtime_bin, &name, command, timeout).await
            }
            _ => Err(AppError::sandbox_unavailable("sandbox has no active policy")),
        }
    }

    async fn stop(&self, project: ProjectId, policy: StopPolicy) -> AppResult<()> {
        let entry = self.entry(project);
        let mut record = entry.lock().await;

        if policy == StopPolicy::LeaveRunning {
            // Default on orderly session end: leave running for reuse.
            return Ok(());
        }

        record.lifecycle = SandboxLifecycle::Stopping;
        if let Some(name) = record.container_name.clone() {
            container::stop(&self.runtime_bin, &name).await?;
        }
        record.lifecycle = SandboxLifecycle::Gone;
        Ok(())
    }

    async fn destroy(&self, project: ProjectId) -> AppResult<()> {
        let entry = self.entry(project);
        let mut record = entry.lock().await;

        record.lifecycle = SandboxLifecycle::Stopping;
        if let Some(name) = record.container_name.take() {
            container::stop(&self.runtime_bin, &name).await?;
            container::remove(&self.runtime_bin, &name).await?;
        }
        record.lifecycle = SandboxLifecycle::Gone;
        record.workspace_path = None;
        record.policy = None;
        Ok(())
    }

    async fn health(&self, project: ProjectId) -> AppResult<SandboxLifecycle> {
        let entry = self.entry(project);
        let record = entry.lock().await;
        Ok(record.lifecycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoforge_core::SandboxKind;

    fn none_policy() -> SandboxPolicy {
        SandboxPolicy {
            kind: SandboxKind::None,
            ..SandboxPolicy::default()
        }
    }

    #[tokio::test]
    async fn none_policy_start_is_immediately_ready() {
        let manager = SandboxManager::new("docker");
        let project = ProjectId::new();
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = manager
            .start(project, dir.path(), &none_policy())
            .await
            .unwrap();
        assert_eq!(lifecycle, SandboxLifecycle::Ready);
    }

    #[tokio::test]
    async fn none_policy_exec_runs_on_host() {
        let manager = SandboxManager::new("docker");
        let project = ProjectId::new();
        let dir = tempfile::tempdir().unwrap();
        manager
            .start(project, dir.path(), &none_policy())
            .await
            .unwrap();
        let outcome = manager
            .exec(project, "echo hello", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn none_policy_exec_is_security_gated() {
        let manager = SandboxManager::new("docker");
        let project = ProjectId::new();
        let dir = tempfile::tempdir().unwrap();
        manager
            .start(project, dir.path(), &none_policy())
            .await
            .unwrap();
        let err = manager
            .exec(project, "sudo rm -rf /", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SecurityDenied(_)));
    }

    #[tokio::test]
    async fn exec_before_start_is_sandbox_unavailable() {
        let manager = SandboxManager::new("docker");
        let project = ProjectId::new();
        let err = manager
            .exec(project, "echo hi", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SandboxUnavailable(_)));
    }

    #[tokio::test]
    async fn remote_cloud_is_not_implemented() {
        let manager = SandboxManager::new("docker");
        let project = ProjectId::new();
        let dir = tempfile::tempdir().unwrap();
        let policy = SandboxPolicy {
            kind: SandboxKind::RemoteCloud,
            ..SandboxPolicy::default()
        };
        let err = manager.start(project, dir.path(), &policy).await.unwrap_err();
        assert!(matches!(err, AppError::SandboxUnavailable(_)));
    }

    #[tokio::test]
    async fn health_reports_not_created_before_start() {
        let manager = SandboxManager::new("docker");
        let project = ProjectId::new();
        assert_eq!(
            manager.health(project).await.unwrap(),
            SandboxLifecycle::NotCreated
        );
    }
}
