//! Storage-row types (spec §3 DATA MODEL).
//!
//! These layer timestamps and surrogate relationships on top of the
//! dependency-free vocabulary in `autoforge_core::model`; the enums and ids
//! themselves live there so the Sandbox Manager and Tool Bridge can share
//! them without depending on the database.

mod epic;
mod project;
mod quality_check;
mod session;
mod task;
mod test_case;

pub use epic::Epic;
pub use project::Project;
pub use quality_check::QualityCheck;
pub use session::Session;
pub use task::Task;
pub use test_case::TestCase;
