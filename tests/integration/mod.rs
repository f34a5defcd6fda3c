//! Cross-component scenarios from spec §8, exercised against a real
//! sqlite-backed `TaskStore` and the `none` sandbox (no container runtime,
//! no external agent process required).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use autoforge_core::{AppError, Sandbox, SandboxKind, SandboxPolicy, SessionKind, SessionStatus, TestOutcome};
use autoforge_orchestrator::config::Config;
use autoforge_orchestrator::services::orchestrator::SessionOrchestrator;
use autoforge_orchestrator::services::sandbox as sandbox_service;
use autoforge_orchestrator::storage::{Database, PromptVersions, TaskStore};
use autoforge_sandbox::SandboxManager;

struct Harness {
    store: Arc<TaskStore>,
    sandbox: Arc<dyn Sandbox>,
    dir: tempfile::TempDir,
}

fn none_policy() -> SandboxPolicy {
    SandboxPolicy { kind: SandboxKind::None, ..SandboxPolicy::default() }
}

async fn harness() -> Harness {
    let db = Database::open_in_memory().unwrap();
    let store = Arc::new(TaskStore::new(db));
    let sandbox = sandbox_service::build_sandbox_manager("docker");
    let dir = tempfile::tempdir().unwrap();
    Harness { store, sandbox, dir }
}

impl Harness {
    fn workspace(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    async fn new_project(&self, name: &str) -> autoforge_core::ProjectId {
        self.store
            .create_project(name, self.workspace(), self.workspace().join("app_spec.md"), none_policy(), PromptVersions::default())
            .await
            .unwrap()
    }

    fn orchestrator(&self) -> SessionOrchestrator {
        let mut config = Config::for_tests();
        config.agent_bin = "/definitely/not/a/real/autoforge-agent-binary".to_string();
        SessionOrchestrator::new(self.store.clone(), self.sandbox.clone(), config)
    }
}

/// S1: a task cannot be marked done while any of its tests is not passing
/// (invariant 2), and `get_next_task` always returns the lowest-ordinal
/// open task (invariant 4).
#[tokio::test]
async fn task_completion_requires_all_tests_passing() {
    let h = harness().await;
    let project = h.new_project("demo").await;
    let epic = h.store.create_epic(project, 0, "Epic 1", "").await.unwrap();
    let task = h.store.create_task(epic, 0, "Task 1", "").await.unwrap();
    let test = h.store.create_test(task, "does the thing").await.unwrap();

    let err = h.store.update_task_status(task, true).await.unwrap_err();
    assert_eq!(err.kind(), "precondition");

    h.store.update_test_result(test, TestOutcome::Pass).await.unwrap();
    h.store.update_task_status(task, true).await.unwrap();

    let progress = h.store.project_progress(project).await.unwrap();
    assert_eq!(progress.done_tasks, 1);
    assert!(h.store.get_next_task(project).await.unwrap().is_none());
}

/// Flipping a passing test back to `fail` re-opens a `done` task
/// (invariant 2's cascade, covered by `update_test_result`).
#[tokio::test]
async fn failing_a_test_reopens_its_done_task() {
    let h = harness().await;
    let project = h.new_project("demo").await;
    let epic = h.store.create_epic(project, 0, "Epic 1", "").await.unwrap();
    let task = h.store.create_task(epic, 0, "Task 1", "").await.unwrap();
    let test = h.store.create_test(task, "does the thing").await.unwrap();

    h.store.update_test_result(test, TestOutcome::Pass).await.unwrap();
    h.store.update_task_status(task, true).await.unwrap();

    h.store.update_test_result(test, TestOutcome::Fail).await.unwrap();
    let reopened = h.store.get_task(task).await.unwrap();
    assert_eq!(reopened.status, autoforge_core::WorkStatus::InProgress);
}

/// S4: resetting a project clears its hierarchy but the project row, and
/// therefore its id, survives (SPEC_FULL §2 Open Question 3).
#[tokio::test]
async fn reset_project_clears_hierarchy_but_keeps_project_row() {
    let h = harness().await;
    let project = h.new_project("demo").await;
    let epic = h.store.create_epic(project, 0, "Epic 1", "").await.unwrap();
    h.store.create_task(epic, 0, "Task 1", "").await.unwrap();
    h.store.create_session(project, SessionKind::Initializer, "model").await.unwrap();

    h.store.reset_project(project).await.unwrap();

    assert!(h.store.list_epics(project).await.unwrap().is_empty());
    assert!(h.store.latest_session_number(project).await.unwrap().is_none());
    // The project itself is untouched.
    h.store.get_project(project).await.unwrap();
}

/// Invariant 6: quality checks upsert by `(session, kind)`, never
/// duplicating a row for the same session/kind pair.
#[tokio::test]
async fn quality_check_attach_upserts_by_session_and_kind() {
    let h = harness().await;
    let project = h.new_project("demo").await;
    let session = h.store.create_session(project, SessionKind::Coding, "model").await.unwrap();

    h.store
        .attach_quality_check(
            session,
            autoforge_core::QualityCheckKind::Quick,
            Some(8),
            Default::default(),
            Default::default(),
            None,
        )
        .await
        .unwrap();
    h.store
        .attach_quality_check(
            session,
            autoforge_core::QualityCheckKind::Quick,
            Some(5),
            Default::default(),
            Default::default(),
            None,
        )
        .await
        .unwrap();

    let check = h
        .store
        .get_quality_check(session, autoforge_core::QualityCheckKind::Quick)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(check.rating, Some(5));
}

/// The host-level security gate denies destructive commands reached
/// through the `none` sandbox's `exec`, regardless of sandbox kind.
#[tokio::test]
async fn none_sandbox_exec_denies_destructive_commands() {
    let sandbox = SandboxManager::new("docker");
    let project = autoforge_core::ProjectId::new();
    let dir = tempfile::tempdir().unwrap();
    sandbox.start(project, dir.path(), &none_policy()).await.unwrap();

    let err = sandbox.exec(project, "sudo rm -rf /", Duration::from_secs(5)).await.unwrap_err();
    assert_eq!(err.kind(), "security_denied");

    let ok = sandbox.exec(project, "echo hi", Duration::from_secs(5)).await.unwrap();
    assert_eq!(ok.stdout.trim(), "hi");
}

/// S5/crash recovery: a session that never finalizes (agent transport
/// never started) stays `running` until `reconcile` marks it `cancelled`
/// on the next startup (spec §5 "Crash recovery").
#[tokio::test]
async fn reconcile_cancels_sessions_orphaned_by_a_crash() {
    let h = harness().await;
    let project = h.new_project("demo").await;
    let orchestrator = h.orchestrator();

    let err = orchestrator.run_session(project).await.unwrap_err();
    assert_eq!(err.kind(), "agent_transport");

    let sessions = h.store.list_open_sessions(project).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Running);

    let recovered = h.store.reconcile().await.unwrap();
    assert_eq!(recovered, 1);
    let session = h.store.get_session(sessions[0].id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
}

/// Property 4: a project with no sessions is always routed to the
/// initializer, and a coding session is refused until `init.sh` exists
/// (the initializer's own deliverable).
#[tokio::test]
async fn coding_session_is_refused_before_initializer_completes() {
    let h = harness().await;
    let project = h.new_project("demo").await;
    h.store.create_session(project, SessionKind::Initializer, "model").await.unwrap();

    let orchestrator = h.orchestrator();
    let err = orchestrator.run_session(project).await.unwrap_err();
    assert_eq!(err.kind(), "precondition");
}

/// Once `init.sh` exists, a fresh project routes to a coding session and
/// (since no binary is available to drive it) fails transport-side rather
/// than silently skipping the sandbox-provisioning step.
#[tokio::test]
async fn coding_session_provisions_sandbox_once_initializer_artifact_exists() {
    let h = harness().await;
    let project = h.new_project("demo").await;
    h.store.create_session(project, SessionKind::Initializer, "model").await.unwrap();
    std::fs::write(h.workspace().join("init.sh"), "#!/bin/sh\n").unwrap();

    let orchestrator = h.orchestrator();
    let err = orchestrator.run_session(project).await.unwrap_err();
    assert_eq!(err.kind(), "agent_transport");
    assert_eq!(h.sandbox.health(project).await.unwrap(), autoforge_core::SandboxLifecycle::Ready);
}

/// `sessions_since_last_deep_review` counts every session since the last
/// deep check, inclusive of the current one when none has ever run.
#[tokio::test]
async fn staleness_counter_resets_after_a_deep_review() {
    let h = harness().await;
    let project = h.new_project("demo").await;
    let first = h.store.create_session(project, SessionKind::Coding, "model").await.unwrap();
    assert_eq!(h.store.sessions_since_last_deep_review(project, 0).await.unwrap(), 1);

    h.store
        .attach_quality_check(first, autoforge_core::QualityCheckKind::Deep, Some(9), Default::default(), Default::default(), Some("RATING: 9".to_string()))
        .await
        .unwrap();
    h.store.create_session(project, SessionKind::Coding, "model").await.unwrap();

    assert_eq!(h.store.sessions_since_last_deep_review(project, 1).await.unwrap(), 1);
}

/// Cross-project isolation (testable property 8) holds at the storage
/// layer: entities resolve to their owning project, not the caller's.
#[tokio::test]
async fn entities_resolve_to_their_true_owning_project() {
    let h = harness().await;
    let project_a = h.new_project("project-a").await;
    let project_b = h.new_project("project-b").await;
    let epic = h.store.create_epic(project_a, 0, "Epic", "").await.unwrap();

    assert_eq!(h.store.epic_project(epic).await.unwrap(), project_a);
    assert_ne!(h.store.epic_project(epic).await.unwrap(), project_b);
}

/// Cancelling an idle (no session running) project is a harmless no-op;
/// cancelling mid-run would require a real long-lived agent process to
/// exercise end-to-end.
#[tokio::test]
async fn cancel_without_a_running_session_is_a_no_op() {
    let h = harness().await;
    let project = h.new_project("demo").await;
    h.orchestrator().cancel(project);
}

/// `AppError` propagates its `kind`/`retriable` pair unchanged through
/// `ToolError`'s conversion, which is what the Tool Bridge hands back to
/// the agent on every failed call (spec §7).
#[test]
fn app_error_to_tool_error_preserves_retriability() {
    let err = AppError::sandbox_unavailable("docker daemon unreachable");
    let tool_err: autoforge_core::ToolError = (&err).into();
    assert!(tool_err.retriable);
    assert_eq!(tool_err.kind, "sandbox_unavailable");
}
