//! Task execution engine.
//!
//! Contains the orchestrator that owns every task's lifecycle from
//! submission to terminal state, plus the interpretation of progress
//! reports from the generation service.

pub mod orchestrator;
pub mod progress;

pub use orchestrator::{Deleted, OrchestratorConfig, TaskOrchestrator};
