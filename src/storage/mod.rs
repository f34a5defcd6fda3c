//! Persistent state layer: SQLite connection management plus the Task
//! Store's hierarchical operations (spec §4.3, §6).

pub mod database;
pub mod task_store;

pub use database::{DbPool, Database};
pub use task_store::{ProgressView, PromptVersions, QualityCounters, QualityIssues, TaskStore};
