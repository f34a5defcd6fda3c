//! Session Orchestrator (C7, spec §4.7).
//!
//! Per-project state machine:
//! `IDLE -> PROVISIONING -> RUNNING -> POST -> (AUTO_CHAIN -> IDLE) or HALTED`,
//! with a `CANCELLING -> HALTED` side path. [`run_session`] drives one
//! iteration of that machine (steps 1-6 of the per-session procedure);
//! [`run_until_halt`] adds the auto-chain decision (step 7) and loops.
//! Exactly one session runs per project at a time, enforced by the same
//! per-project-lock pattern the Sandbox Manager uses for its own registry.

use std::sync::Arc;

use autoforge_core::{
    AppError, AppResult, ProjectId, Sandbox, SessionEvent, SessionEventKind, SessionId, SessionKind,
    SessionStatus,
};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::models::Project;
use crate::services::agent_driver::{AgentDriver, AgentRequest, SessionOutcome};
use crate::services::log_sink::EventLogSink;
use crate::services::quality;
use crate::services::sandbox as sandbox_service;
use crate::services::tool_bridge::ToolBridge;
use crate::storage::TaskStore;
use crate::utils::paths::{init_script_path, session_log_jsonl, session_log_txt, session_review_md};

/// An `agent_transport` failure within this many events is retried once
/// rather than finalized (spec §7).
const TRANSPORT_RETRY_EVENT_WINDOW: u64 = 10;

/// One completed run of [`SessionOrchestrator::run_session`].
pub struct RunOutcome {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub outcome: SessionOutcome,
}

pub struct SessionOrchestrator {
    store: Arc<TaskStore>,
    sandbox: Arc<dyn Sandbox>,
    agent: AgentDriver,
    config: Config,
    locks: DashMap<ProjectId, Arc<Mutex<()>>>,
    cancel_tokens: DashMap<ProjectId, CancellationToken>,
}

impl SessionOrchestrator {
    pub fn new(store: Arc<TaskStore>, sandbox: Arc<dyn Sandbox>, config: Config) -> Self {
        let agent = AgentDriver::new(
            config.agent_bin.clone(),
            config.agent_auth_token.clone(),
            config.agent_buffer_cap_bytes,
        );
        Self {
            store,
            sandbox,
            agent,
            config,
            locks: DashMap::new(),
            cancel_tokens: DashMap::new(),
        }
    }

    fn lock_for(&self, project: ProjectId) -> Arc<Mutex<()>> {
        self.locks.entry(project).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Requests cooperative cancellation of `project`'s current session, if
    /// one is running. A no-op otherwise (spec §5 "Cancellation").
    pub fn cancel(&self, project: ProjectId) {
        if let Some(token) = self.cancel_tokens.get(&project) {
            token.cancel();
        }
    }

    /// Runs exactly one session for `project`: steps 1-6 of the per-session
    /// procedure. The auto-chain decision (step 7) is [`run_until_halt`]'s
    /// job, since it spans multiple sessions.
    pub async fn run_session(&self, project: ProjectId) -> AppResult<RunOutcome> {
        let lock = self.lock_for(project);
        let _guard = lock.lock().await;

        let project_row = self.store.get_project(project).await?;
        let kind = self.choose_kind(project).await?;

        if kind == SessionKind::Coding && !init_script_path(&project_row.workspace_path).exists() {
            return Err(AppError::precondition(
                "workspace has no init.sh; the initializer session has not completed",
            ));
        }

        if kind == SessionKind::Initializer {
            // First session in a project always gets a freshly configured
            // sandbox (spec §4.7 step 2); destroy is a no-op if none exists.
            let _ = self.sandbox.destroy(project).await;
        }
        sandbox_service::provision(
            self.sandbox.as_ref(),
            project,
            &project_row.workspace_path,
            &project_row.sandbox_policy,
        )
        .await?;

        let model = match kind {
            SessionKind::Initializer => self.config.initializer_model.clone(),
            SessionKind::Coding => self.config.coding_model.clone(),
            SessionKind::Review => {
                return Err(AppError::internal(
                    "review sessions are scheduled by the quality gate, not chosen here",
                ))
            }
        };

        let session_id = self.store.create_session(project, kind, &model).await?;
        let session_number = self.store.get_session(session_id).await?.session_number;

        let outcome = self
            .run_agent_with_retry(&project_row, project, session_id, session_number, kind, model)
            .await?;

        let metrics = json!({ "collected_text_len": outcome.collected_text.len() });
        self.store
            .finalize_session(
                session_id,
                outcome.status,
                outcome.tool_use_count as i64,
                outcome.error_count as i64,
                outcome.tokens.clone(),
                metrics,
            )
            .await?;

        self.run_quality_gate(project, &project_row, session_id, session_number, kind).await?;

        Ok(RunOutcome { session_id, kind, outcome })
    }

    /// If the project has no session 0 yet, it's the initializer; otherwise
    /// every session is `coding` (review sessions are never chosen here,
    /// spec §4.7 step 1).
    async fn choose_kind(&self, project: ProjectId) -> AppResult<SessionKind> {
        Ok(match self.store.latest_session_number(project).await? {
            None => SessionKind::Initializer,
            Some(_) => SessionKind::Coding,
        })
    }

    /// Opens the session's log and tool bridge and drives one Agent Driver
    /// invocation, retrying once if it fails transport-side within the
    /// first [`TRANSPORT_RETRY_EVENT_WINDOW`] events (spec §7
    /// "agent_transport").
    async fn run_agent_with_retry(
        &self,
        project_row: &Project,
        project: ProjectId,
        session_id: SessionId,
        session_number: i64,
        kind: SessionKind,
        model: String,
    ) -> AppResult<SessionOutcome> {
        let first = self.run_agent_once(project_row, project, session_id, session_number, kind, &model).await?;
        if first.status == SessionStatus::Failed
            && first.failure_kind == Some("agent_transport")
            && first.event_count < TRANSPORT_RETRY_EVENT_WINDOW
        {
            tracing::warn!(%session_id, "agent_transport failure within retry window, retrying once");
            return self.run_agent_once(project_row, project, session_id, session_number, kind, &model).await;
        }
        Ok(first)
    }

    async fn run_agent_once(
        &self,
        project_row: &Project,
        project: ProjectId,
        session_id: SessionId,
        session_number: i64,
        kind: SessionKind,
        model: &str,
    ) -> AppResult<SessionOutcome> {
        let log = Arc::new(Mutex::new(EventLogSink::open(&project_row.workspace_path, session_number, kind)?));
        log.lock()
            .await
            .append(SessionEvent::new(
                &session_id.to_string(),
                SessionEventKind::SessionStart { kind: kind.as_str().to_string(), model: model.to_string() },
                Utc::now(),
            ))?;

        let tool_bridge = ToolBridge::new(
            project,
            session_id,
            self.store.clone(),
            self.sandbox.clone(),
            self.config.exec_timeout,
            log.clone(),
        );

        let cancel = CancellationToken::new();
        self.cancel_tokens.insert(project, cancel.clone());

        // The in-memory `cancel_tokens` entry only reaches a `cancel()` call
        // made against this same orchestrator instance; a `cancel` issued by
        // a separate CLI invocation can only reach this session through the
        // Task Store, so a background poll bridges the two.
        let poll_store = self.store.clone();
        let poll_cancel = cancel.clone();
        let poll_interval = self.config.cancel_poll_interval;
        let poll_handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                if poll_cancel.is_cancelled() {
                    return;
                }
                if matches!(poll_store.is_cancellation_requested(project).await, Ok(true)) {
                    poll_cancel.cancel();
                    return;
                }
            }
        });

        let request = AgentRequest {
            workspace_path: project_row.workspace_path.clone(),
            session_kind: kind,
            sandbox_kind: project_row.sandbox_policy.kind,
            model: model.to_string(),
            resume_session_id: None,
            transcript: None,
        };

        let outcome = self
            .agent
            .run(request, &session_id.to_string(), &tool_bridge, &log, cancel)
            .await;
        poll_handle.abort();
        self.cancel_tokens.remove(&project);
        let _ = self.store.clear_cancellation_request(project).await;
        drop(tool_bridge);

        let log = Arc::try_unwrap(log)
            .map_err(|_| AppError::internal("event log sink still referenced after agent run"))?
            .into_inner();
        log.close()?;

        outcome
    }

    /// Quick review always runs synchronously; a deep review is scheduled
    /// on a detached background task when the staleness/rating/cadence
    /// trigger fires (spec §4.8, §5 "Deep reviews run on a background task
    /// pool; they do not block auto-chain").
    async fn run_quality_gate(
        &self,
        project: ProjectId,
        project_row: &Project,
        session_id: SessionId,
        session_number: i64,
        kind: SessionKind,
    ) -> AppResult<()> {
        let jsonl_path = session_log_jsonl(&project_row.workspace_path, session_number, kind);
        let records = quality::load_records(&jsonl_path)?;
        let quick = quality::run_quick(&self.store, session_id, &records, kind).await?;

        let sessions_since_last_deep =
            self.store.sessions_since_last_deep_review(project, session_number).await?;
        if quality::should_run_deep(session_number, quick.rating, sessions_since_last_deep) {
            self.spawn_deep_review(project, project_row, session_id, session_number, quick);
        }
        Ok(())
    }

    fn spawn_deep_review(
        &self,
        project: ProjectId,
        project_row: &Project,
        session_id: SessionId,
        session_number: i64,
        quick: autoforge_quality_gates::QuickReviewResult,
    ) {
        let store = self.store.clone();
        let sandbox = self.sandbox.clone();
        let agent = self.agent.clone();
        let workspace_path = project_row.workspace_path.clone();
        let sandbox_kind = project_row.sandbox_policy.kind;
        let model = self.config.coding_model.clone();
        let exec_timeout = self.config.exec_timeout;

        tokio::spawn(async move {
            let text_result: AppResult<String> = async {
                let transcript = std::fs::read_to_string(session_log_txt(&workspace_path, session_number, SessionKind::Coding)).ok();

                let log = Arc::new(Mutex::new(EventLogSink::open(
                    &workspace_path,
                    session_number,
                    SessionKind::Review,
                )?));
                let tool_bridge = ToolBridge::new(
                    project,
                    session_id,
                    store.clone(),
                    sandbox.clone(),
                    exec_timeout,
                    log.clone(),
                );
                let request = AgentRequest {
                    workspace_path: workspace_path.clone(),
                    session_kind: SessionKind::Review,
                    sandbox_kind,
                    model,
                    resume_session_id: None,
                    transcript,
                };
                let review_id = format!("{session_id}-review");
                let outcome = agent
                    .run(request, &review_id, &tool_bridge, &log, CancellationToken::new())
                    .await?;
                drop(tool_bridge);

                let log = Arc::try_unwrap(log)
                    .map_err(|_| AppError::internal("review log sink still referenced"))?
                    .into_inner();
                log.close()?;
                std::fs::write(session_review_md(&workspace_path, session_number), &outcome.collected_text)?;
                Ok(outcome.collected_text)
            }
            .await;

            if let Err(ref err) = text_result {
                tracing::warn!(%session_id, error = %err, "deep review invocation failed");
            }
            if let Err(err) = quality::run_deep(store, session_id, quick.rating, &quick, text_result).await {
                tracing::error!(%session_id, error = %err, "failed to persist deep review outcome");
            }
        });
    }

    /// Drives `project` through repeated sessions until step 7's auto-chain
    /// decision halts it: after the initializer (human review required),
    /// after the consecutive-failure threshold trips, or once no non-done
    /// task remains.
    pub async fn run_until_halt(&self, project: ProjectId) -> AppResult<()> {
        let mut consecutive_failures = 0u32;
        loop {
            let run = self.run_session(project).await?;

            if run.kind == SessionKind::Initializer {
                return Ok(());
            }

            consecutive_failures = match run.outcome.status {
                SessionStatus::Failed => consecutive_failures + 1,
                SessionStatus::Cancelled => consecutive_failures,
                _ => 0,
            };
            if consecutive_failures >= self.config.consecutive_failure_threshold {
                tracing::info!(%project, consecutive_failures, "auto-chain halted on consecutive failures");
                return Ok(());
            }

            let progress = self.store.project_progress(project).await?;
            let work_remains = progress.total_tasks > progress.done_tasks;
            if !work_remains {
                return Ok(());
            }

            tokio::time::sleep(self.config.auto_continue_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoforge_core::{SandboxKind, SandboxPolicy};
    use autoforge_sandbox::SandboxManager;
    use std::fs;
    use std::time::Duration;

    async fn new_orchestrator() -> (SessionOrchestrator, tempfile::TempDir) {
        let db = crate::storage::Database::open_in_memory().unwrap();
        let store = Arc::new(TaskStore::new(db));
        let sandbox: Arc<dyn Sandbox> = Arc::new(SandboxManager::new("docker"));
        let mut config = Config::for_tests();
        config.agent_bin = "/definitely/not/a/real/agent-binary".to_string();
        let dir = tempfile::tempdir().unwrap();
        (SessionOrchestrator::new(store, sandbox, config), dir)
    }

    async fn seed_project(orch: &SessionOrchestrator, dir: &tempfile::TempDir) -> ProjectId {
        fs::create_dir_all(dir.path().join("logs")).unwrap();
        orch.store
            .create_project(
                "demo",
                dir.path().to_path_buf(),
                dir.path().join("app_spec.md"),
                SandboxPolicy { kind: SandboxKind::None, ..SandboxPolicy::default() },
                crate::storage::PromptVersions::default(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn choose_kind_is_initializer_for_a_fresh_project() {
        let (orch, dir) = new_orchestrator().await;
        let project = seed_project(&orch, &dir).await;
        assert_eq!(orch.choose_kind(project).await.unwrap(), SessionKind::Initializer);
    }

    #[tokio::test]
    async fn coding_session_requires_init_script() {
        let (orch, dir) = new_orchestrator().await;
        let project = seed_project(&orch, &dir).await;
        orch.store.create_session(project, SessionKind::Initializer, "m").await.unwrap();

        let err = orch.run_session(project).await.unwrap_err();
        assert_eq!(err.kind(), "precondition");
    }

    #[tokio::test]
    async fn cancel_on_idle_project_is_a_harmless_no_op() {
        let (orch, dir) = new_orchestrator().await;
        let project = seed_project(&orch, &dir).await;
        orch.cancel(project);
    }

    /// Property 7: a cancel signal reaches a session that is actually
    /// running, whether it was requested in-process (`orch.cancel`) or
    /// through the durable Task Store flag a separate CLI process would use.
    #[tokio::test]
    async fn cancel_propagates_to_a_session_actually_running() {
        let db = crate::storage::Database::open_in_memory().unwrap();
        let store = Arc::new(TaskStore::new(db));
        let sandbox: Arc<dyn Sandbox> = Arc::new(SandboxManager::new("docker"));
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("logs")).unwrap();

        let script_path = dir.path().join("fake-agent.sh");
        fs::write(
            &script_path,
            "#!/bin/sh\necho '{\"type\":\"assistant\",\"content\":\"hi\"}'\nsleep 5\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&script_path).unwrap().permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&script_path, perms).unwrap();
        }

        let mut config = Config::for_tests();
        config.agent_bin = script_path.to_string_lossy().to_string();
        config.cancel_poll_interval = Duration::from_millis(10);

        let project = store
            .create_project(
                "demo",
                dir.path().to_path_buf(),
                dir.path().join("app_spec.md"),
                SandboxPolicy { kind: SandboxKind::None, ..SandboxPolicy::default() },
                crate::storage::PromptVersions::default(),
            )
            .await
            .unwrap();

        let orch = Arc::new(SessionOrchestrator::new(store.clone(), sandbox, config));
        let run_orch = orch.clone();
        let handle = tokio::spawn(async move { run_orch.run_session(project).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        store.request_cancellation(project).await.unwrap();

        let run = handle.await.unwrap().unwrap();
        assert_eq!(run.outcome.status, SessionStatus::Cancelled);
        assert!(!store.is_cancellation_requested(project).await.unwrap());
    }
}
