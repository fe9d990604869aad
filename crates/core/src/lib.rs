//! Domain model for EasyVideo generation tasks.
//!
//! Pure types and rules with no I/O: the task record and its state
//! machine, the domain error taxonomy, and event-name constants shared
//! by the broadcaster and the streaming endpoint.

pub mod error;
pub mod task;
pub mod task_events;
pub mod types;
