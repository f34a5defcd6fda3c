//! Status enums and small value types shared by the Task Store, Sandbox
//! Manager, and Tool Bridge. Concrete row types (`Project`, `Epic`, `Task`,
//! ...) live in the root crate's `models` module since they carry
//! storage-row concerns (timestamps as stored strings, etc); this module
//! holds only the dependency-free vocabulary those rows are built from.

use serde::{Deserialize, Serialize};

/// Status of an Epic or Task (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    InProgress,
    Done,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(crate::error::AppError::internal(format!(
                "unknown work status: {other}"
            ))),
        }
    }
}

/// Outcome of a Test (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Unknown,
    Pass,
    Fail,
}

impl TestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }
}

impl std::str::FromStr for TestOutcome {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            other => Err(crate::error::AppError::internal(format!(
                "unknown test outcome: {other}"
            ))),
        }
    }
}

/// Kind of session (spec §3, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Initializer,
    Coding,
    Review,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializer => "initializer",
            Self::Coding => "coding",
            Self::Review => "review",
        }
    }
}

impl std::str::FromStr for SessionKind {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializer" => Ok(Self::Initializer),
            "coding" => Ok(Self::Coding),
            "review" => Ok(Self::Review),
            other => Err(crate::error::AppError::internal(format!(
                "unknown session kind: {other}"
            ))),
        }
    }
}

/// Lifecycle status of a Session (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses make a session immutable (invariant 5) except for
    /// QualityCheck attachment.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(crate::error::AppError::internal(format!(
                "unknown session status: {other}"
            ))),
        }
    }
}

/// Kind of quality check (spec §3, invariant 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCheckKind {
    Quick,
    Deep,
}

impl QualityCheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Deep => "deep",
        }
    }
}

impl std::str::FromStr for QualityCheckKind {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quick" => Ok(Self::Quick),
            "deep" => Ok(Self::Deep),
            other => Err(crate::error::AppError::internal(format!(
                "unknown quality check kind: {other}"
            ))),
        }
    }
}

/// Sandbox backend variant (spec §4.4, §9 "Polymorphic sandbox").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxKind {
    /// No isolation: `exec` falls back to direct host execution, gated by
    /// the security denylist.
    None,
    /// Local container runtime (docker/podman compatible CLI).
    Container,
    /// Remote cloud-hosted sandbox (interface only; not implemented here).
    RemoteCloud,
}

impl Default for SandboxKind {
    fn default() -> Self {
        Self::Container
    }
}

/// Resource and provisioning policy for a project's sandbox (SPEC_FULL §2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxPolicy {
    pub kind: SandboxKind,
    /// Container image to provision (ignored for `SandboxKind::None`).
    pub image: String,
    pub memory_mb: u32,
    pub cpu_limit: f32,
    /// Language runtimes/tools to pre-install (shell, vcs, etc).
    pub runtimes: Vec<String>,
    /// Per-call `exec` timeout.
    pub exec_timeout_secs: u64,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            kind: SandboxKind::Container,
            image: "autoforge/sandbox-base:latest".to_string(),
            memory_mb: 2048,
            cpu_limit: 2.0,
            runtimes: vec!["bash".to_string(), "git".to_string()],
            exec_timeout_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn work_status_roundtrips() {
        for s in [WorkStatus::Pending, WorkStatus::InProgress, WorkStatus::Done] {
            assert_eq!(WorkStatus::from_str(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn session_status_terminal() {
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn unknown_status_is_an_internal_error() {
        assert!(WorkStatus::from_str("bogus").is_err());
    }
}
