//! Sandbox Manager (spec §4.4)
//!
//! Per-project isolated execution environment lifecycle and command
//! execution, behind the `autoforge_core::Sandbox` capability trait so that
//! the orchestrator and Tool Bridge never depend on a concrete backend.

pub mod container;
pub mod manager;
pub mod none;
pub mod record;

pub use manager::SandboxManager;
