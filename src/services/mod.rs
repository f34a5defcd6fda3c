//! The eight components from spec §4, minus the Security Gate (lives in
//! `autoforge_security`, a dependency-free workspace crate with nothing
//! project-specific to wrap) and the Task Store (lives at `crate::storage`
//! alongside the database connection it owns).

pub mod agent_driver;
pub mod log_sink;
pub mod orchestrator;
pub mod quality;
pub mod sandbox;
pub mod tool_bridge;
