//! Quality Analyzer quick path (spec §4.8).
//!
//! Pure derivation of a quality signal — rating, counters, and issue lists —
//! from a session's parsed structured event log. No I/O, no external model
//! calls: the deep-review path that spawns a review agent lives in the root
//! crate, which calls into `quick::analyze` for the quick path and as a
//! fallback when the deep review's own rating can't be extracted.

pub mod models;
pub mod quick;

pub use models::{Issue, LogRecord, QuickReviewResult};
pub use quick::{analyze, is_browser_tool_name};
