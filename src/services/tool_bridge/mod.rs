//! Tool Bridge (C5, spec §4.5, §6 "Tool catalog exposed by C5").
//!
//! An in-process tool server bound to exactly one project and session. It
//! never accepts a caller-supplied project id, which is what makes scope
//! isolation (spec §8 testable property 8) structural rather than a
//! per-call check the agent could route around: every operation resolves
//! its target entity's owning project through the Task Store and rejects
//! it outright if that project isn't the one this bridge was built for.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use autoforge_core::{
    AppError, AppResult, EpicId, ExecOutcome, ProjectId, Sandbox, TaskId, TestId, TestOutcome, ToolError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::models::{Epic, Task, TestCase};
use crate::services::log_sink::EventLogSink;
use crate::storage::{ProgressView, TaskStore};

/// Tool-call inputs are bounded so a single oversized payload can't stall
/// the bridge or balloon the log (spec §4.5 "oversized inputs return a
/// bounded-size error without being buffered").
pub const MAX_INPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct EpicIdInput {
    epic_id: String,
}

#[derive(Debug, Deserialize)]
struct TaskIdInput {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct TestIdInput {
    test_id: String,
}

#[derive(Debug, Deserialize)]
struct UpdateTaskStatusInput {
    task_id: String,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct UpdateTestResultInput {
    test_id: String,
    outcome: String,
}

#[derive(Debug, Deserialize)]
struct CreateEpicInput {
    ordinal: i64,
    title: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct CreateTaskInput {
    epic_id: String,
    ordinal: i64,
    title: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct CreateTestInput {
    task_id: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ExpandEpicTaskInput {
    title: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ExpandEpicInput {
    epic_id: String,
    tasks: Vec<ExpandEpicTaskInput>,
}

#[derive(Debug, Deserialize)]
struct LogSessionInput {
    note: String,
}

#[derive(Debug, Deserialize)]
struct ExecInput {
    command: String,
}

#[derive(Debug, Serialize)]
struct EpicSummary {
    id: String,
    status: &'static str,
}

fn status_str(status: autoforge_core::WorkStatus) -> &'static str {
    status.as_str()
}

/// Bound to one `(project, session)` pair at construction, per spec §4.5
/// ("parameterized at construction with `{project_id, sandbox_handle,
/// task_store_handle, event_sink}`").
pub struct ToolBridge {
    project: ProjectId,
    session: autoforge_core::SessionId,
    store: Arc<TaskStore>,
    sandbox: Arc<dyn Sandbox>,
    exec_timeout: Duration,
    log: Arc<Mutex<EventLogSink>>,
}

impl ToolBridge {
    pub fn new(
        project: ProjectId,
        session: autoforge_core::SessionId,
        store: Arc<TaskStore>,
        sandbox: Arc<dyn Sandbox>,
        exec_timeout: Duration,
        log: Arc<Mutex<EventLogSink>>,
    ) -> Self {
        Self {
            project,
            session,
            store,
            sandbox,
            exec_timeout,
            log,
        }
    }

    /// Dispatch one call by tool name. `raw_input` is the agent-supplied
    /// JSON payload, checked against [`MAX_INPUT_BYTES`] before any
    /// deserialization is attempted.
    pub async fn call(&self, tool_name: &str, raw_input: &str) -> Result<Value, ToolError> {
        if raw_input.len() > MAX_INPUT_BYTES {
            return Err(ToolError::from(AppError::validation(format!(
                "input for `{tool_name}` exceeds {MAX_INPUT_BYTES} bytes"
            ))));
        }
        self.dispatch(tool_name, raw_input).await.map_err(ToolError::from)
    }

    async fn dispatch(&self, tool_name: &str, raw_input: &str) -> AppResult<Value> {
        match tool_name {
            "task_status" => {
                let progress = self.store.project_progress(self.project).await?;
                Ok(serde_json::to_value(progress)?)
            }
            "get_next_task" => {
                let task = self.store.get_next_task(self.project).await?;
                Ok(serde_json::to_value(task)?)
            }
            "list_epics" => {
                let epics = self.store.list_epics(self.project).await?;
                Ok(serde_json::to_value(epics)?)
            }
            "get_epic" => {
                let input: EpicIdInput = parse(raw_input)?;
                let epic = self.checked_epic(&input.epic_id).await?;
                Ok(serde_json::to_value(epic)?)
            }
            "list_tasks" => {
                let input: EpicIdInput = parse(raw_input)?;
                let epic = self.checked_epic(&input.epic_id).await?;
                let tasks = self.store.list_tasks(epic.id).await?;
                Ok(serde_json::to_value(tasks)?)
            }
            "get_task" => {
                let input: TaskIdInput = parse(raw_input)?;
                let task = self.checked_task(&input.task_id).await?;
                Ok(serde_json::to_value(task)?)
            }
            "list_tests" => {
                let input: TaskIdInput = parse(raw_input)?;
                let task = self.checked_task(&input.task_id).await?;
                let tests = self.store.list_tests(task.id).await?;
                Ok(serde_json::to_value(tests)?)
            }
            "update_task_status" => {
                let input: UpdateTaskStatusInput = parse(raw_input)?;
                let task = self.checked_task(&input.task_id).await?;
                self.store.update_task_status(task.id, input.done).await?;
                Ok(Value::Null)
            }
            "start_task" => {
                let input: TaskIdInput = parse(raw_input)?;
                let task = self.checked_task(&input.task_id).await?;
                self.store.start_task(task.id).await?;
                Ok(Value::Null)
            }
            "update_test_result" => {
                let input: UpdateTestResultInput = parse(raw_input)?;
                let test = self.checked_test(&input.test_id).await?;
                let outcome = TestOutcome::from_str(&input.outcome)?;
                self.store.update_test_result(test.id, outcome).await?;
                Ok(Value::Null)
            }
            "create_epic" => {
                let input: CreateEpicInput = parse(raw_input)?;
                let id = self
                    .store
                    .create_epic(self.project, input.ordinal, &input.title, &input.description)
                    .await?;
                Ok(serde_json::to_value(EpicSummary {
                    id: id.to_string(),
                    status: status_str(autoforge_core::WorkStatus::Pending),
                })?)
            }
            "create_task" => {
                let input: CreateTaskInput = parse(raw_input)?;
                let epic = self.checked_epic(&input.epic_id).await?;
                let id = self
                    .store
                    .create_task(epic.id, input.ordinal, &input.title, &input.description)
                    .await?;
                Ok(Value::String(id.to_string()))
            }
            "create_test" => {
                let input: CreateTestInput = parse(raw_input)?;
                let task = self.checked_task(&input.task_id).await?;
                let id = self.store.create_test(task.id, &input.description).await?;
                Ok(Value::String(id.to_string()))
            }
            "expand_epic" => {
                let input: ExpandEpicInput = parse(raw_input)?;
                let epic = self.checked_epic(&input.epic_id).await?;
                let existing = self.store.list_tasks(epic.id).await?;
                let mut next_ordinal = existing.len() as i64;
                let mut created = Vec::with_capacity(input.tasks.len());
                for task in input.tasks {
                    let id = self
                        .store
                        .create_task(epic.id, next_ordinal, &task.title, &task.description)
                        .await?;
                    created.push(id.to_string());
                    next_ordinal += 1;
                }
                Ok(serde_json::to_value(created)?)
            }
            "log_session" => {
                let input: LogSessionInput = parse(raw_input)?;
                let event = autoforge_core::SessionEvent::new(
                    self.session.to_string(),
                    autoforge_core::SessionEventKind::SystemNotice {
                        subtype: "session_note".to_string(),
                        detail: input.note,
                    },
                    chrono::Utc::now(),
                );
                self.log.lock().await.append(event)?;
                Ok(Value::Null)
            }
            "exec" => {
                let input: ExecInput = parse(raw_input)?;
                let outcome = self.exec(&input.command).await?;
                Ok(serde_json::to_value(outcome)?)
            }
            other => Err(AppError::validation(format!("unknown tool `{other}`"))),
        }
    }

    async fn exec(&self, command: &str) -> AppResult<ExecOutcome> {
        self.sandbox.exec(self.project, command, self.exec_timeout).await
    }

    async fn checked_epic(&self, raw_id: &str) -> AppResult<Epic> {
        let id: EpicId = raw_id
            .parse()
            .map_err(|_| AppError::validation(format!("malformed epic id: {raw_id}")))?;
        let owner = self.store.epic_project(id).await?;
        if owner != self.project {
            return Err(AppError::forbidden(format!("epic {id} does not belong to this project")));
        }
        self.store.get_epic(id).await
    }

    async fn checked_task(&self, raw_id: &str) -> AppResult<Task> {
        let id: TaskId = raw_id
            .parse()
            .map_err(|_| AppError::validation(format!("malformed task id: {raw_id}")))?;
        let owner = self.store.task_project(id).await?;
        if owner != self.project {
            return Err(AppError::forbidden(format!("task {id} does not belong to this project")));
        }
        self.store.get_task(id).await
    }

    async fn checked_test(&self, raw_id: &str) -> AppResult<TestCase> {
        let id: TestId = raw_id
            .parse()
            .map_err(|_| AppError::validation(format!("malformed test id: {raw_id}")))?;
        let owner = self.store.test_project(id).await?;
        if owner != self.project {
            return Err(AppError::forbidden(format!("test {id} does not belong to this project")));
        }
        self.store.get_test(id).await
    }
}

fn parse<T: for<'de> Deserialize<'de>>(raw_input: &str) -> AppResult<T> {
    serde_json::from_str(raw_input).map_err(|e| AppError::validation(format!("malformed tool input: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoforge_core::{SandboxKind, SandboxPolicy};
    use autoforge_sandbox::SandboxManager;
    use std::path::PathBuf;

    struct Fixture {
        store: Arc<TaskStore>,
        sandbox: Arc<dyn Sandbox>,
        dir: tempfile::TempDir,
    }

    async fn setup() -> Fixture {
        let db = crate::storage::Database::open_in_memory().unwrap();
        let store = Arc::new(TaskStore::new(db));
        let sandbox: Arc<dyn Sandbox> = Arc::new(SandboxManager::new("docker"));
        let dir = tempfile::tempdir().unwrap();
        Fixture { store, sandbox, dir }
    }

    async fn bridge_for(fixture: &Fixture, name: &str) -> ToolBridge {
        let project = fixture
            .store
            .create_project(
                name,
                fixture.dir.path().to_path_buf(),
                fixture.dir.path().join("app_spec.md"),
                SandboxPolicy::default(),
                crate::storage::PromptVersions::default(),
            )
            .await
            .unwrap();
        fixture
            .sandbox
            .start(
                project,
                fixture.dir.path(),
                &SandboxPolicy {
                    kind: SandboxKind::None,
                    ..SandboxPolicy::default()
                },
            )
            .await
            .unwrap();
        let log = Arc::new(Mutex::new(
            EventLogSink::open(&fixture.dir.path().to_path_buf(), 0, autoforge_core::SessionKind::Coding)
                .unwrap(),
        ));
        ToolBridge::new(
            project,
            autoforge_core::SessionId::new(),
            fixture.store.clone(),
            fixture.sandbox.clone(),
            Duration::from_secs(5),
            log,
        )
    }

    #[tokio::test]
    async fn create_and_fetch_epic_round_trips() {
        let fixture = setup().await;
        let bridge = bridge_for(&fixture, "demo").await;
        let created = bridge
            .call("create_epic", r#"{"ordinal":0,"title":"Epic 1","description":""}"#)
            .await
            .unwrap();
        let epic_id = created.get("id").unwrap().as_str().unwrap().to_string();

        let fetched = bridge
            .call("get_epic", &format!(r#"{{"epic_id":"{epic_id}"}}"#))
            .await
            .unwrap();
        assert_eq!(fetched.get("title").unwrap().as_str().unwrap(), "Epic 1");
    }

    #[tokio::test]
    async fn cross_project_epic_access_is_forbidden() {
        let fixture = setup().await;
        let bridge_a = bridge_for(&fixture, "project-a").await;
        let bridge_b = bridge_for(&fixture, "project-b").await;

        let created = bridge_a
            .call("create_epic", r#"{"ordinal":0,"title":"Mine","description":""}"#)
            .await
            .unwrap();
        let epic_id = created.get("id").unwrap().as_str().unwrap().to_string();

        let err = bridge_b
            .call("get_epic", &format!(r#"{{"epic_id":"{epic_id}"}}"#))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "forbidden");
    }

    #[tokio::test]
    async fn oversized_input_is_rejected_before_parsing() {
        let fixture = setup().await;
        let bridge = bridge_for(&fixture, "demo").await;
        let oversized = "x".repeat(MAX_INPUT_BYTES + 1);
        let err = bridge.call("log_session", &oversized).await.unwrap_err();
        assert_eq!(err.kind, "validation");
    }

    #[tokio::test]
    async fn exec_runs_through_sandbox() {
        let fixture = setup().await;
        let bridge = bridge_for(&fixture, "demo").await;
        let result = bridge.call("exec", r#"{"command":"echo hi"}"#).await.unwrap();
        assert_eq!(result.get("stdout").unwrap().as_str().unwrap().trim(), "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_validation_error() {
        let fixture = setup().await;
        let bridge = bridge_for(&fixture, "demo").await;
        let err = bridge.call("not_a_tool", "{}").await.unwrap_err();
        assert_eq!(err.kind, "validation");
    }
}
