//! Task Store (C3, spec §4.3).
//!
//! Owns the relational schema for projects/epics/tasks/tests/sessions/
//! quality. Mutations within one project serialize on a per-project
//! advisory lock taken at the start of any state-changing operation;
//! cross-project operations take no shared locks and readers never block
//! writers (spec §4.3 "Concurrency").

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::{params, OptionalExtension};
use tokio::sync::Mutex;

use autoforge_core::{
    AppError, AppResult, EpicId, ProjectId, QualityCheckId, QualityCheckKind, SandboxPolicy,
    SessionId, SessionKind, SessionStatus, TaskId, TestId, TestOutcome, TokenUsage, WorkStatus,
};
use autoforge_quality_gates::Issue;

use crate::models::{Epic, Project, QualityCheck, Session, Task, TestCase};
use crate::storage::database::Database;

/// Prompt-version refs active for a project's sessions (spec §3 "active
/// prompt-version refs").
#[derive(Debug, Clone)]
pub struct PromptVersions {
    pub initializer: String,
    pub coding: String,
    pub review: String,
}

impl Default for PromptVersions {
    fn default() -> Self {
        Self {
            initializer: "v1".to_string(),
            coding: "v1".to_string(),
            review: "v1".to_string(),
        }
    }
}

/// Aggregate counters attached to a `QualityCheck` (spec §3 "counters").
#[derive(Debug, Clone, Default)]
pub struct QualityCounters {
    pub tool_uses: i64,
    pub errors: i64,
    pub browser_verifications: i64,
}

/// Issue lists attached to a `QualityCheck` (spec §4.8).
#[derive(Debug, Clone, Default)]
pub struct QualityIssues {
    pub critical: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

/// Totals/completed counts for one level of the hierarchy (SPEC_FULL §2
/// "v_progress").
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressView {
    pub total_epics: i64,
    pub done_epics: i64,
    pub total_tasks: i64,
    pub done_tasks: i64,
    pub total_tests: i64,
    pub passing_tests: i64,
}

fn parse_ts(s: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::internal(format!("bad timestamp `{s}`: {e}")))
}

fn parse_opt_ts(s: Option<String>) -> AppResult<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(&s)).transpose()
}

fn parse_id<T: FromStr>(s: &str, what: &str) -> AppResult<T> {
    T::from_str(s).map_err(|_| AppError::internal(format!("malformed {what} id: {s}")))
}

fn epic_status(total_tasks: i64, done_tasks: i64) -> WorkStatus {
    if total_tasks > 0 && total_tasks == done_tasks {
        WorkStatus::Done
    } else if done_tasks > 0 {
        WorkStatus::InProgress
    } else {
        WorkStatus::Pending
    }
}

/// Durable hierarchical state for every project: epics/tasks/tests/
/// sessions/quality checks, with transactional cascades enforcing
/// invariants 2 and 3.
pub struct TaskStore {
    db: Database,
    locks: DashMap<ProjectId, Arc<Mutex<()>>>,
}

impl TaskStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, project: ProjectId) -> Arc<Mutex<()>> {
        self.locks
            .entry(project)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ---- Project --------------------------------------------------------

    pub async fn create_project(
        &self,
        name: &str,
        workspace_path: PathBuf,
        spec_path: PathBuf,
        sandbox_policy: SandboxPolicy,
        prompt_versions: PromptVersions,
    ) -> AppResult<ProjectId> {
        let id = ProjectId::new();
        let now = Utc::now();
        let policy_json = serde_json::to_string(&sandbox_policy)?;

        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        conn.execute(
            "INSERT INTO projects (id, name, workspace_path, spec_path, sandbox_policy,
                initializer_prompt_version, coding_prompt_version, review_prompt_version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id.to_string(),
                name,
                workspace_path.to_string_lossy(),
                spec_path.to_string_lossy(),
                policy_json,
                prompt_versions.initializer,
                prompt_versions.coding,
                prompt_versions.review,
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;

        Ok(id)
    }

    pub async fn get_project(&self, project: ProjectId) -> AppResult<Project> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let row = conn
            .query_row(
                "SELECT id, name, workspace_path, spec_path, sandbox_policy,
                    initializer_prompt_version, coding_prompt_version, review_prompt_version, created_at
                 FROM projects WHERE id = ?1",
                params![project.to_string()],
                Self::row_to_project_tuple,
            )
            .optional()
            .map_err(|e| AppError::storage(e.to_string()))?
            .ok_or_else(|| AppError::not_found(format!("project {project} not found")))?;

        Self::project_from_tuple(row)
    }

    /// Every registered project, oldest first; used by the `serve`
    /// entry point to discover what to run on startup (SPEC_FULL §1 "CLI /
    /// process entry").
    pub async fn list_projects(&self) -> AppResult<Vec<Project>> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, workspace_path, spec_path, sandbox_policy,
                    initializer_prompt_version, coding_prompt_version, review_prompt_version, created_at
                 FROM projects ORDER BY created_at ASC, rowid ASC",
            )
            .map_err(|e| AppError::storage(e.to_string()))?;
        let rows: Vec<_> = stmt
            .query_map([], Self::row_to_project_tuple)
            .map_err(|e| AppError::storage(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::storage(e.to_string()))?;

        rows.into_iter().map(Self::project_from_tuple).collect()
    }

    #[allow(clippy::type_complexity)]
    fn row_to_project_tuple(
        row: &rusqlite::Row,
    ) -> rusqlite::Result<(String, String, String, String, String, String, String, String, String)> {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, String>(8)?,
        ))
    }

    fn project_from_tuple(
        row: (String, String, String, String, String, String, String, String, String),
    ) -> AppResult<Project> {
        let (id, name, workspace_path, spec_path, policy_json, init_v, coding_v, review_v, created_at) = row;
        Ok(Project {
            id: parse_id(&id, "project")?,
            name,
            workspace_path: PathBuf::from(workspace_path),
            spec_path: PathBuf::from(spec_path),
            sandbox_policy: serde_json::from_str(&policy_json)?,
            initializer_prompt_version: init_v,
            coding_prompt_version: coding_v,
            review_prompt_version: review_v,
            created_at: parse_ts(&created_at)?,
        })
    }

    /// Deletes all epics/tasks/tests/sessions/quality checks for a project
    /// but preserves the project row, allowing a fresh session 0
    /// (SPEC_FULL §2, Open Question 3).
    pub async fn reset_project(&self, project: ProjectId) -> AppResult<()> {
        let lock = self.lock_for(project);
        let _guard = lock.lock().await;

        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        conn.execute(
            "DELETE FROM epics WHERE project_id = ?1",
            params![project.to_string()],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;
        conn.execute(
            "DELETE FROM sessions WHERE project_id = ?1",
            params![project.to_string()],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;
        Ok(())
    }

    // ---- Epics / Tasks / Tests ------------------------------------------

    pub async fn create_epic(
        &self,
        project: ProjectId,
        ordinal: i64,
        title: &str,
        description: &str,
    ) -> AppResult<EpicId> {
        let lock = self.lock_for(project);
        let _guard = lock.lock().await;

        let id = EpicId::new();
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        conn.execute(
            "INSERT INTO epics (id, project_id, ordinal, title, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.to_string(),
                project.to_string(),
                ordinal,
                title,
                description,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;
        Ok(id)
    }

    pub async fn create_task(
        &self,
        epic: EpicId,
        ordinal: i64,
        title: &str,
        description: &str,
    ) -> AppResult<TaskId> {
        let project = self.epic_project(epic).await?;
        let lock = self.lock_for(project);
        let _guard = lock.lock().await;

        let id = TaskId::new();
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        conn.execute(
            "INSERT INTO tasks (id, epic_id, ordinal, title, description, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                epic.to_string(),
                ordinal,
                title,
                description,
                WorkStatus::Pending.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;
        Ok(id)
    }

    pub async fn create_test(&self, task: TaskId, description: &str) -> AppResult<TestId> {
        let project = self.task_project(task).await?;
        let lock = self.lock_for(project);
        let _guard = lock.lock().await;

        let id = TestId::new();
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        conn.execute(
            "INSERT INTO tests (id, task_id, description, outcome, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                task.to_string(),
                description,
                TestOutcome::Unknown.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;
        Ok(id)
    }

    pub async fn get_epic(&self, epic: EpicId) -> AppResult<Epic> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        self.query_epic(&conn, epic)
    }

    fn query_epic(&self, conn: &rusqlite::Connection, epic: EpicId) -> AppResult<Epic> {
        let row = conn
            .query_row(
                "SELECT e.id, e.project_id, e.ordinal, e.title, e.description, e.created_at,
                    (SELECT COUNT(*) FROM tasks WHERE epic_id = e.id),
                    (SELECT COUNT(*) FROM tasks WHERE epic_id = e.id AND status = 'done')
                 FROM epics e WHERE e.id = ?1",
                params![epic.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| AppError::storage(e.to_string()))?
            .ok_or_else(|| AppError::not_found(format!("epic {epic} not found")))?;

        let (id, project_id, ordinal, title, description, created_at, total_tasks, done_tasks) = row;
        Ok(Epic {
            id: parse_id(&id, "epic")?,
            project_id: parse_id(&project_id, "project")?,
            ordinal,
            title,
            description,
            status: epic_status(total_tasks, done_tasks),
            created_at: parse_ts(&created_at)?,
        })
    }

    pub async fn list_epics(&self, project: ProjectId) -> AppResult<Vec<Epic>> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT id FROM epics WHERE project_id = ?1 ORDER BY ordinal ASC, rowid ASC",
            )
            .map_err(|e| AppError::storage(e.to_string()))?;
        let ids: Vec<String> = stmt
            .query_map(params![project.to_string()], |row| row.get(0))
            .map_err(|e| AppError::storage(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::storage(e.to_string()))?;
        drop(stmt);

        ids.into_iter()
            .map(|id| self.query_epic(&conn, parse_id(&id, "epic")?))
            .collect()
    }

    pub async fn get_task(&self, task: TaskId) -> AppResult<Task> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        self.query_task(&conn, task)
    }

    fn query_task(&self, conn: &rusqlite::Connection, task: TaskId) -> AppResult<Task> {
        let row = conn
            .query_row(
                "SELECT id, epic_id, ordinal, title, description, status, started_at, completed_at, created_at
                 FROM tasks WHERE id = ?1",
                params![task.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| AppError::storage(e.to_string()))?
            .ok_or_else(|| AppError::not_found(format!("task {task} not found")))?;

        let (id, epic_id, ordinal, title, description, status, started_at, completed_at, created_at) = row;
        Ok(Task {
            id: parse_id(&id, "task")?,
            epic_id: parse_id(&epic_id, "epic")?,
            ordinal,
            title,
            description,
            status: WorkStatus::from_str(&status)?,
            started_at: parse_opt_ts(started_at)?,
            completed_at: parse_opt_ts(completed_at)?,
            created_at: parse_ts(&created_at)?,
        })
    }

    pub async fn list_tasks(&self, epic: EpicId) -> AppResult<Vec<Task>> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT id FROM tasks WHERE epic_id = ?1 ORDER BY ordinal ASC, rowid ASC")
            .map_err(|e| AppError::storage(e.to_string()))?;
        let ids: Vec<String> = stmt
            .query_map(params![epic.to_string()], |row| row.get(0))
            .map_err(|e| AppError::storage(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::storage(e.to_string()))?;
        drop(stmt);

        ids.into_iter()
            .map(|id| self.query_task(&conn, parse_id(&id, "task")?))
            .collect()
    }

    pub async fn get_test(&self, test: TestId) -> AppResult<TestCase> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        self.query_test(&conn, test)
    }

    fn query_test(&self, conn: &rusqlite::Connection, test: TestId) -> AppResult<TestCase> {
        let row = conn
            .query_row(
                "SELECT id, task_id, description, outcome, verification_note, created_at
                 FROM tests WHERE id = ?1",
                params![test.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| AppError::storage(e.to_string()))?
            .ok_or_else(|| AppError::not_found(format!("test {test} not found")))?;

        let (id, task_id, description, outcome, verification_note, created_at) = row;
        Ok(TestCase {
            id: parse_id(&id, "test")?,
            task_id: parse_id(&task_id, "task")?,
            description,
            outcome: TestOutcome::from_str(&outcome)?,
            verification_note,
            created_at: parse_ts(&created_at)?,
        })
    }

    pub async fn list_tests(&self, task: TaskId) -> AppResult<Vec<TestCase>> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT id FROM tests WHERE task_id = ?1 ORDER BY rowid ASC")
            .map_err(|e| AppError::storage(e.to_string()))?;
        let ids: Vec<String> = stmt
            .query_map(params![task.to_string()], |row| row.get(0))
            .map_err(|e| AppError::storage(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::storage(e.to_string()))?;
        drop(stmt);

        ids.into_iter()
            .map(|id| self.query_test(&conn, parse_id(&id, "test")?))
            .collect()
    }

    /// Resolves the owning project of a task, for Tool Bridge scope checks
    /// and per-project locking (spec §4.5 "the agent for project P cannot
    /// read or mutate project Q").
    pub async fn task_project(&self, task: TaskId) -> AppResult<ProjectId> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let raw: String = conn
            .query_row(
                "SELECT e.project_id FROM tasks t JOIN epics e ON t.epic_id = e.id WHERE t.id = ?1",
                params![task.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::storage(e.to_string()))?
            .ok_or_else(|| AppError::not_found(format!("task {task} not found")))?;
        parse_id(&raw, "project")
    }

    pub async fn epic_project(&self, epic: EpicId) -> AppResult<ProjectId> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let raw: String = conn
            .query_row(
                "SELECT project_id FROM epics WHERE id = ?1",
                params![epic.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::storage(e.to_string()))?
            .ok_or_else(|| AppError::not_found(format!("epic {epic} not found")))?;
        parse_id(&raw, "project")
    }

    pub async fn test_project(&self, test: TestId) -> AppResult<ProjectId> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let raw: String = conn
            .query_row(
                "SELECT e.project_id FROM tests x
                 JOIN tasks t ON x.task_id = t.id
                 JOIN epics e ON t.epic_id = e.id
                 WHERE x.id = ?1",
                params![test.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::storage(e.to_string()))?
            .ok_or_else(|| AppError::not_found(format!("test {test} not found")))?;
        parse_id(&raw, "project")
    }

    // ---- Progress and next-task (invariant 4) ---------------------------

    /// Lowest-ordinal Task whose status is not `done`, from the
    /// lowest-ordinal Epic with any non-done task; ties broken by creation
    /// order (invariant 4, testable property 3).
    pub async fn get_next_task(&self, project: ProjectId) -> AppResult<Option<Task>> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let id: Option<String> = conn
            .query_row(
                "SELECT t.id FROM tasks t
                 JOIN epics e ON t.epic_id = e.id
                 WHERE e.project_id = ?1 AND t.status != 'done'
                 ORDER BY e.ordinal ASC, e.rowid ASC, t.ordinal ASC, t.rowid ASC
                 LIMIT 1",
                params![project.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::storage(e.to_string()))?;

        match id {
            Some(id) => Ok(Some(self.query_task(&conn, parse_id(&id, "task")?)?)),
            None => Ok(None),
        }
    }

    pub async fn start_task(&self, task: TaskId) -> AppResult<()> {
        let project = self.task_project(task).await?;
        let lock = self.lock_for(project);
        let _guard = lock.lock().await;

        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        conn.execute(
            "UPDATE tasks SET status = ?2, started_at = COALESCE(started_at, ?3)
             WHERE id = ?1 AND status != 'done'",
            params![
                task.to_string(),
                WorkStatus::InProgress.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;
        Ok(())
    }

    /// `done=true` requires every child test to be `pass` (invariant 2);
    /// callers who try otherwise get a `Precondition` error.
    pub async fn update_task_status(&self, task: TaskId, done: bool) -> AppResult<()> {
        let project = self.task_project(task).await?;
        let lock = self.lock_for(project);
        let _guard = lock.lock().await;

        let mut conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::storage(e.to_string()))?;

        if done {
            let failing: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM tests WHERE task_id = ?1 AND outcome != 'pass'",
                    params![task.to_string()],
                    |row| row.get(0),
                )
                .map_err(|e| AppError::storage(e.to_string()))?;
            if failing > 0 {
                return Err(AppError::precondition(format!(
                    "task {task} has {failing} test(s) not passing"
                )));
            }
            tx.execute(
                "UPDATE tasks SET status = ?2, completed_at = ?3 WHERE id = ?1",
                params![
                    task.to_string(),
                    WorkStatus::Done.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| AppError::storage(e.to_string()))?;
        } else {
            tx.execute(
                "UPDATE tasks SET
                    status = CASE WHEN started_at IS NULL THEN ?2 ELSE ?3 END,
                    completed_at = NULL
                 WHERE id = ?1",
                params![
                    task.to_string(),
                    WorkStatus::Pending.as_str(),
                    WorkStatus::InProgress.as_str(),
                ],
            )
            .map_err(|e| AppError::storage(e.to_string()))?;
        }

        tx.commit().map_err(|e| AppError::storage(e.to_string()))?;
        Ok(())
    }

    /// Cascades to the parent task per invariant 2, inside the same
    /// transaction: flipping a test away from `pass` re-opens a `done`
    /// task.
    pub async fn update_test_result(&self, test: TestId, outcome: TestOutcome) -> AppResult<()> {
        let project = self.test_project(test).await?;
        let lock = self.lock_for(project);
        let _guard = lock.lock().await;

        let mut conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::storage(e.to_string()))?;

        tx.execute(
            "UPDATE tests SET outcome = ?2 WHERE id = ?1",
            params![test.to_string(), outcome.as_str()],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;

        let task_id: String = tx
            .query_row(
                "SELECT task_id FROM tests WHERE id = ?1",
                params![test.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| AppError::storage(e.to_string()))?;

        if outcome != TestOutcome::Pass {
            tx.execute(
                "UPDATE tasks SET
                    status = CASE WHEN started_at IS NULL THEN ?2 ELSE ?3 END,
                    completed_at = NULL
                 WHERE id = ?1 AND status = 'done'",
                params![
                    task_id,
                    WorkStatus::Pending.as_str(),
                    WorkStatus::InProgress.as_str(),
                ],
            )
            .map_err(|e| AppError::storage(e.to_string()))?;
        }

        tx.commit().map_err(|e| AppError::storage(e.to_string()))?;
        Ok(())
    }

    pub async fn project_progress(&self, project: ProjectId) -> AppResult<ProgressView> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let mut progress = conn
            .query_row(
                "SELECT
                    (SELECT COUNT(*) FROM epics WHERE project_id = ?1),
                    (SELECT COUNT(*) FROM tasks t JOIN epics e ON t.epic_id = e.id WHERE e.project_id = ?1),
                    (SELECT COUNT(*) FROM tasks t JOIN epics e ON t.epic_id = e.id WHERE e.project_id = ?1 AND t.status = 'done'),
                    (SELECT COUNT(*) FROM tests x JOIN tasks t ON x.task_id = t.id JOIN epics e ON t.epic_id = e.id WHERE e.project_id = ?1),
                    (SELECT COUNT(*) FROM tests x JOIN tasks t ON x.task_id = t.id JOIN epics e ON t.epic_id = e.id WHERE e.project_id = ?1 AND x.outcome = 'pass')",
                params![project.to_string()],
                |row| {
                    Ok(ProgressView {
                        total_epics: row.get(0)?,
                        done_epics: 0,
                        total_tasks: row.get(1)?,
                        done_tasks: row.get(2)?,
                        total_tests: row.get(3)?,
                        passing_tests: row.get(4)?,
                    })
                },
            )
            .map_err(|e| AppError::storage(e.to_string()))?;

        progress.done_epics = conn
            .query_row(
                "SELECT COUNT(*) FROM epics e WHERE e.project_id = ?1 AND
                    (SELECT COUNT(*) FROM tasks WHERE epic_id = e.id) > 0 AND
                    (SELECT COUNT(*) FROM tasks WHERE epic_id = e.id AND status != 'done') = 0",
                params![project.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| AppError::storage(e.to_string()))?;

        Ok(progress)
    }

    pub async fn epic_progress(&self, epic: EpicId) -> AppResult<ProgressView> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM tasks WHERE epic_id = ?1),
                (SELECT COUNT(*) FROM tasks WHERE epic_id = ?1 AND status = 'done'),
                (SELECT COUNT(*) FROM tests x JOIN tasks t ON x.task_id = t.id WHERE t.epic_id = ?1),
                (SELECT COUNT(*) FROM tests x JOIN tasks t ON x.task_id = t.id WHERE t.epic_id = ?1 AND x.outcome = 'pass')",
            params![epic.to_string()],
            |row| {
                Ok(ProgressView {
                    total_epics: 1,
                    done_epics: 0,
                    total_tasks: row.get(0)?,
                    done_tasks: row.get(1)?,
                    total_tests: row.get(2)?,
                    passing_tests: row.get(3)?,
                })
            },
        )
        .map_err(|e| AppError::storage(e.to_string()))
    }

    // ---- Sessions ---------------------------------------------------------

    /// Allocates the next `session_number` atomically under the
    /// project's advisory lock (spec §4.3 "allocates next session_number
    /// atomically").
    pub async fn create_session(
        &self,
        project: ProjectId,
        kind: SessionKind,
        model: &str,
    ) -> AppResult<SessionId> {
        let lock = self.lock_for(project);
        let _guard = lock.lock().await;

        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let next_number: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(session_number), -1) + 1 FROM sessions WHERE project_id = ?1",
                params![project.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| AppError::storage(e.to_string()))?;

        let id = SessionId::new();
        conn.execute(
            "INSERT INTO sessions (id, project_id, session_number, kind, status, model, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                project.to_string(),
                next_number,
                kind.as_str(),
                SessionStatus::Running.as_str(),
                model,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;

        Ok(id)
    }

    pub async fn get_session(&self, session: SessionId) -> AppResult<Session> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        self.query_session(&conn, session)
    }

    fn query_session(&self, conn: &rusqlite::Connection, session: SessionId) -> AppResult<Session> {
        let row = conn
            .query_row(
                "SELECT id, project_id, session_number, kind, status, model, started_at, ended_at,
                    tool_uses, errors, tokens_input, tokens_output, tokens_cache_creation, tokens_cache_read, metrics
                 FROM sessions WHERE id = ?1",
                params![session.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, i64>(8)?,
                        row.get::<_, i64>(9)?,
                        row.get::<_, i64>(10)?,
                        row.get::<_, i64>(11)?,
                        row.get::<_, i64>(12)?,
                        row.get::<_, i64>(13)?,
                        row.get::<_, String>(14)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| AppError::storage(e.to_string()))?
            .ok_or_else(|| AppError::not_found(format!("session {session} not found")))?;

        let (
            id, project_id, session_number, kind, status, model, started_at, ended_at,
            tool_uses, errors, tokens_input, tokens_output, tokens_cache_creation, tokens_cache_read, metrics,
        ) = row;

        Ok(Session {
            id: parse_id(&id, "session")?,
            project_id: parse_id(&project_id, "project")?,
            session_number,
            kind: SessionKind::from_str(&kind)?,
            status: SessionStatus::from_str(&status)?,
            model,
            started_at: parse_ts(&started_at)?,
            ended_at: parse_opt_ts(ended_at)?,
            tool_uses,
            errors,
            tokens: TokenUsage {
                input: tokens_input as u64,
                output: tokens_output as u64,
                cache_creation: tokens_cache_creation as u64,
                cache_read: tokens_cache_read as u64,
            },
            metrics: serde_json::from_str(&metrics)?,
        })
    }

    /// Terminal transition (invariant 5); subsequent mutation attempts
    /// fail because the row's status is no longer `running`.
    pub async fn finalize_session(
        &self,
        session: SessionId,
        status: SessionStatus,
        tool_uses: i64,
        errors: i64,
        tokens: TokenUsage,
        metrics: serde_json::Value,
    ) -> AppResult<()> {
        if !status.is_terminal() {
            return Err(AppError::precondition(
                "finalize_session requires a terminal status",
            ));
        }

        let existing = self.get_session(session).await?;
        let lock = self.lock_for(existing.project_id);
        let _guard = lock.lock().await;

        if existing.status.is_terminal() {
            return Err(AppError::precondition(format!(
                "session {session} is already terminal ({})",
                existing.status.as_str()
            )));
        }

        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        conn.execute(
            "UPDATE sessions SET status = ?2, ended_at = ?3, tool_uses = ?4, errors = ?5,
                tokens_input = ?6, tokens_output = ?7, tokens_cache_creation = ?8, tokens_cache_read = ?9,
                metrics = ?10
             WHERE id = ?1",
            params![
                session.to_string(),
                status.as_str(),
                Utc::now().to_rfc3339(),
                tool_uses,
                errors,
                tokens.input as i64,
                tokens.output as i64,
                tokens.cache_creation as i64,
                tokens.cache_read as i64,
                serde_json::to_string(&metrics)?,
            ],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;

        Ok(())
    }

    /// At most one `running` session per project by design; used for
    /// crash recovery (spec §4.3 "used for crash recovery").
    pub async fn list_open_sessions(&self, project: ProjectId) -> AppResult<Vec<Session>> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT id FROM sessions WHERE project_id = ?1 AND status = 'running'")
            .map_err(|e| AppError::storage(e.to_string()))?;
        let ids: Vec<String> = stmt
            .query_map(params![project.to_string()], |row| row.get(0))
            .map_err(|e| AppError::storage(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::storage(e.to_string()))?;
        drop(stmt);

        ids.into_iter()
            .map(|id| self.query_session(&conn, parse_id(&id, "session")?))
            .collect()
    }

    /// Most recently finalized (or still-running) session number for a
    /// project, used by the orchestrator to decide the next session's
    /// kind (spec §4.7 step 1).
    pub async fn latest_session_number(&self, project: ProjectId) -> AppResult<Option<i64>> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        conn.query_row(
            "SELECT MAX(session_number) FROM sessions WHERE project_id = ?1",
            params![project.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| AppError::storage(e.to_string()))
    }

    /// On orchestrator startup, every session in status `running` is
    /// reconciled to `cancelled` (spec §5 "Crash recovery").
    pub async fn reconcile(&self) -> AppResult<usize> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let changed = conn
            .execute(
                "UPDATE sessions SET status = ?1, ended_at = COALESCE(ended_at, ?2) WHERE status = 'running'",
                params![SessionStatus::Cancelled.as_str(), Utc::now().to_rfc3339()],
            )
            .map_err(|e| AppError::storage(e.to_string()))?;
        Ok(changed)
    }

    /// Durable cancellation signal: recorded here rather than in-memory so
    /// a `cancel` invocation reaches a project's session regardless of
    /// which process is actually driving it (spec §5 "Cancellation").
    pub async fn request_cancellation(&self, project: ProjectId) -> AppResult<()> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        conn.execute(
            "INSERT OR IGNORE INTO cancellation_requests (project_id, requested_at) VALUES (?1, ?2)",
            params![project.to_string(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;
        Ok(())
    }

    pub async fn is_cancellation_requested(&self, project: ProjectId) -> AppResult<bool> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM cancellation_requests WHERE project_id = ?1)",
            params![project.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| AppError::storage(e.to_string()))
    }

    /// Consumed once the session it targeted has actually stopped, so a
    /// later session in the same project's auto-chain isn't born cancelled.
    pub async fn clear_cancellation_request(&self, project: ProjectId) -> AppResult<()> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        conn.execute(
            "DELETE FROM cancellation_requests WHERE project_id = ?1",
            params![project.to_string()],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;
        Ok(())
    }

    // ---- Quality checks ---------------------------------------------------

    /// Upsert by (session, kind) per invariant 6.
    pub async fn attach_quality_check(
        &self,
        session: SessionId,
        kind: QualityCheckKind,
        rating: Option<u8>,
        counters: QualityCounters,
        issues: QualityIssues,
        review_text: Option<String>,
    ) -> AppResult<QualityCheckId> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM quality_checks WHERE session_id = ?1 AND check_type = ?2",
                params![session.to_string(), kind.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::storage(e.to_string()))?;

        let id = match existing {
            Some(raw) => parse_id(&raw, "quality_check")?,
            None => QualityCheckId::new(),
        };

        conn.execute(
            "INSERT INTO quality_checks (id, session_id, check_type, rating, tool_uses, errors,
                browser_verifications, critical_issues, warnings, review_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(session_id, check_type) DO UPDATE SET
                rating = excluded.rating,
                tool_uses = excluded.tool_uses,
                errors = excluded.errors,
                browser_verifications = excluded.browser_verifications,
                critical_issues = excluded.critical_issues,
                warnings = excluded.warnings,
                review_text = excluded.review_text",
            params![
                id.to_string(),
                session.to_string(),
                kind.as_str(),
                rating.map(|r| r as i64),
                counters.tool_uses,
                counters.errors,
                counters.browser_verifications,
                serde_json::to_string(&issues.critical)?,
                serde_json::to_string(&issues.warnings)?,
                review_text,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::storage(e.to_string()))?;

        Ok(id)
    }

    pub async fn get_quality_check(
        &self,
        session: SessionId,
        kind: QualityCheckKind,
    ) -> AppResult<Option<QualityCheck>> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let row = conn
            .query_row(
                "SELECT id, session_id, check_type, rating, tool_uses, errors, browser_verifications,
                    critical_issues, warnings, review_text, created_at
                 FROM quality_checks WHERE session_id = ?1 AND check_type = ?2",
                params![session.to_string(), kind.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, String>(10)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| AppError::storage(e.to_string()))?;

        let Some((
            id, session_id, check_type, rating, tool_uses, errors, browser_verifications,
            critical_issues, warnings, review_text, created_at,
        )) = row
        else {
            return Ok(None);
        };

        Ok(Some(QualityCheck {
            id: parse_id(&id, "quality_check")?,
            session_id: parse_id(&session_id, "session")?,
            check_type: QualityCheckKind::from_str(&check_type)?,
            rating: rating.map(|r| r as u8),
            tool_uses,
            errors,
            browser_verifications,
            critical_issues: serde_json::from_str(&critical_issues)?,
            warnings: serde_json::from_str(&warnings)?,
            review_text,
            created_at: parse_ts(&created_at)?,
        }))
    }

    /// How many sessions have been finalized since the project's last deep
    /// review (used by the quality analyzer's staleness trigger, spec
    /// §4.8). Joins through `sessions` since `quality_checks` carries no
    /// project reference of its own. A project with no deep review yet
    /// counts every session it has run, inclusive of the current one.
    pub async fn sessions_since_last_deep_review(
        &self,
        project: ProjectId,
        current_session_number: i64,
    ) -> AppResult<i64> {
        let conn = self
            .db
            .pool()
            .get()
            .map_err(|e| AppError::storage(e.to_string()))?;
        let last_deep: Option<i64> = conn
            .query_row(
                "SELECT MAX(s.session_number) FROM quality_checks q
                 JOIN sessions s ON s.id = q.session_id
                 WHERE s.project_id = ?1 AND q.check_type = 'deep'",
                params![project.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| AppError::storage(e.to_string()))?;

        Ok(match last_deep {
            Some(last) => current_session_number - last,
            None => current_session_number + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoforge_core::SandboxPolicy;

    async fn new_store() -> TaskStore {
        TaskStore::new(Database::open_in_memory().unwrap())
    }

    async fn seed_project(store: &TaskStore) -> ProjectId {
        store
            .create_project(
                "demo",
                PathBuf::from("/tmp/demo"),
                PathBuf::from("/tmp/demo/app_spec.md"),
                SandboxPolicy::default(),
                PromptVersions::default(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_project_round_trips() {
        let store = new_store().await;
        let id = seed_project(&store).await;
        let project = store.get_project(id).await.unwrap();
        assert_eq!(project.name, "demo");
    }

    #[tokio::test]
    async fn list_projects_returns_every_registered_project() {
        let store = new_store().await;
        let a = seed_project(&store).await;
        let b = store
            .create_project(
                "second",
                PathBuf::from("/tmp/second"),
                PathBuf::from("/tmp/second/app_spec.md"),
                SandboxPolicy::default(),
                PromptVersions::default(),
            )
            .await
            .unwrap();

        let projects = store.list_projects().await.unwrap();
        let ids: Vec<_> = projects.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a));
        assert!(ids.contains(&b));
    }

    #[tokio::test]
    async fn cascade_enforcement_s2() {
        let store = new_store().await;
        let project = seed_project(&store).await;
        let epic = store.create_epic(project, 0, "Epic 1", "").await.unwrap();
        let task = store.create_task(epic, 0, "Task 1", "").await.unwrap();
        let t1 = store.create_test(task, "test 1").await.unwrap();
        let t2 = store.create_test(task, "test 2").await.unwrap();

        let err = store.update_task_status(task, true).await.unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)));
        assert_eq!(store.get_task(task).await.unwrap().status, WorkStatus::Pending);

        store.update_test_result(t1, TestOutcome::Pass).await.unwrap();
        store.update_test_result(t2, TestOutcome::Pass).await.unwrap();
        store.update_task_status(task, true).await.unwrap();
        assert_eq!(store.get_task(task).await.unwrap().status, WorkStatus::Done);

        let progress = store.epic_progress(epic).await.unwrap();
        assert_eq!(progress.total_tasks, 1);
        assert_eq!(progress.done_tasks, 1);
    }

    #[tokio::test]
    async fn failing_test_reopens_task_s3() {
        let store = new_store().await;
        let project = seed_project(&store).await;
        let epic = store.create_epic(project, 0, "Epic", "").await.unwrap();
        let task = store.create_task(epic, 0, "Task", "").await.unwrap();
        let t1 = store.create_test(task, "t1").await.unwrap();
        let t2 = store.create_test(task, "t2").await.unwrap();
        store.update_test_result(t1, TestOutcome::Pass).await.unwrap();
        store.update_test_result(t2, TestOutcome::Pass).await.unwrap();
        store.update_task_status(task, true).await.unwrap();

        store.update_test_result(t1, TestOutcome::Fail).await.unwrap();
        let task = store.get_task(task).await.unwrap();
        assert_eq!(task.status, WorkStatus::InProgress);

        let epic = store.get_epic(epic).await.unwrap();
        assert_eq!(epic.status, WorkStatus::InProgress);
    }

    #[tokio::test]
    async fn next_task_follows_ordinal_ordering() {
        let store = new_store().await;
        let project = seed_project(&store).await;
        let epic_a = store.create_epic(project, 0, "A", "").await.unwrap();
        let epic_b = store.create_epic(project, 1, "B", "").await.unwrap();
        let task_a1 = store.create_task(epic_a, 0, "A1", "").await.unwrap();
        let _task_b1 = store.create_task(epic_b, 0, "B1", "").await.unwrap();

        let next = store.get_next_task(project).await.unwrap().unwrap();
        assert_eq!(next.id, task_a1);

        store.create_test(task_a1, "t").await.unwrap();
        let only_test = store.list_tests(task_a1).await.unwrap().remove(0);
        store
            .update_test_result(only_test.id, TestOutcome::Pass)
            .await
            .unwrap();
        store.update_task_status(task_a1, true).await.unwrap();

        let next = store.get_next_task(project).await.unwrap().unwrap();
        assert_eq!(next.epic_id, epic_b);
    }

    #[tokio::test]
    async fn session_numbers_are_dense_per_project() {
        let store = new_store().await;
        let project = seed_project(&store).await;
        let s0 = store
            .create_session(project, SessionKind::Initializer, "model")
            .await
            .unwrap();
        let s1 = store
            .create_session(project, SessionKind::Coding, "model")
            .await
            .unwrap();
        assert_eq!(store.get_session(s0).await.unwrap().session_number, 0);
        assert_eq!(store.get_session(s1).await.unwrap().session_number, 1);
    }

    #[tokio::test]
    async fn finalize_session_is_terminal() {
        let store = new_store().await;
        let project = seed_project(&store).await;
        let session = store
            .create_session(project, SessionKind::Initializer, "model")
            .await
            .unwrap();
        store
            .finalize_session(
                session,
                SessionStatus::Completed,
                3,
                0,
                TokenUsage::default(),
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let err = store
            .finalize_session(
                session,
                SessionStatus::Failed,
                1,
                1,
                TokenUsage::default(),
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)));
    }

    #[tokio::test]
    async fn reconcile_cancels_running_sessions_s4() {
        let store = new_store().await;
        let project = seed_project(&store).await;
        let session = store
            .create_session(project, SessionKind::Coding, "model")
            .await
            .unwrap();
        let changed = store.reconcile().await.unwrap();
        assert_eq!(changed, 1);
        assert_eq!(
            store.get_session(session).await.unwrap().status,
            SessionStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn cancellation_request_is_durable_until_cleared() {
        let store = new_store().await;
        let project = seed_project(&store).await;

        assert!(!store.is_cancellation_requested(project).await.unwrap());
        store.request_cancellation(project).await.unwrap();
        store.request_cancellation(project).await.unwrap();
        assert!(store.is_cancellation_requested(project).await.unwrap());

        store.clear_cancellation_request(project).await.unwrap();
        assert!(!store.is_cancellation_requested(project).await.unwrap());
    }

    #[tokio::test]
    async fn attach_quality_check_upserts_by_kind() {
        let store = new_store().await;
        let project = seed_project(&store).await;
        let session = store
            .create_session(project, SessionKind::Coding, "model")
            .await
            .unwrap();

        store
            .attach_quality_check(
                session,
                QualityCheckKind::Quick,
                Some(7),
                QualityCounters::default(),
                QualityIssues::default(),
                None,
            )
            .await
            .unwrap();
        store
            .attach_quality_check(
                session,
                QualityCheckKind::Quick,
                Some(9),
                QualityCounters::default(),
                QualityIssues::default(),
                None,
            )
            .await
            .unwrap();

        let check = store
            .get_quality_check(session, QualityCheckKind::Quick)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(check.rating, Some(9));
    }

    #[tokio::test]
    async fn sessions_since_last_deep_review_counts_from_last_deep_check() {
        let store = new_store().await;
        let project = seed_project(&store).await;

        let first = store
            .create_session(project, SessionKind::Coding, "model")
            .await
            .unwrap();
        assert_eq!(
            store.sessions_since_last_deep_review(project, 0).await.unwrap(),
            1
        );

        store
            .attach_quality_check(
                first,
                QualityCheckKind::Deep,
                Some(8),
                QualityCounters::default(),
                QualityIssues::default(),
                Some("RATING: 8".to_string()),
            )
            .await
            .unwrap();

        store.create_session(project, SessionKind::Coding, "model").await.unwrap();
        store.create_session(project, SessionKind::Coding, "model").await.unwrap();

        assert_eq!(
            store.sessions_since_last_deep_review(project, 2).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn reset_project_clears_hierarchy_but_keeps_project() {
        let store = new_store().await;
        let project = seed_project(&store).await;
        store.create_epic(project, 0, "E", "").await.unwrap();
        store
            .create_session(project, SessionKind::Initializer, "m")
            .await
            .unwrap();

        store.reset_project(project).await.unwrap();

        assert!(store.get_project(project).await.is_ok());
        assert!(store.list_epics(project).await.unwrap().is_empty());
        assert!(store.list_open_sessions(project).await.unwrap().is_empty());
    }
}
