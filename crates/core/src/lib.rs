//! Autoforge Core
//!
//! Domain identifiers, the `AppError` taxonomy, session event types, and the
//! capability traits (`Sandbox`) that the rest of the workspace builds on.
//! This crate has no I/O and no dependency on any other workspace crate.
//!
//! ## Module Organization
//!
//! - `error` — `AppError`/`AppResult`, and `ToolError` for the Tool Bridge boundary
//! - `ids` — opaque newtype ids for every entity in the data model
//! - `model` — status enums and `SandboxPolicy`
//! - `events` — `SessionEvent`/`SessionEventKind`/`CounterSnapshot`
//! - `traits` — the `Sandbox` capability trait
//! - `streaming` — `StreamAdapter`, the Agent Driver's wire-protocol seam

pub mod error;
pub mod events;
pub mod ids;
pub mod model;
pub mod streaming;
pub mod traits;

pub use error::{AppError, AppResult, ToolError};
pub use events::{CounterSnapshot, SessionEvent, SessionEventKind, TokenUsage};
pub use ids::{EpicId, ProjectId, QualityCheckId, SessionId, TaskId, TestId};
pub use model::{
    QualityCheckKind, SandboxKind, SandboxPolicy, SessionKind, SessionStatus, TestOutcome,
    WorkStatus,
};
pub use streaming::{AdapterError, StreamAdapter};
pub use traits::{ExecOutcome, Sandbox, SandboxLifecycle, StopPolicy};
