//! Storage for EasyVideo tasks.
//!
//! - [`TaskStore`] is the in-memory source of truth for live tasks.
//! - [`TaskLog`] durably records terminal image/video tasks per kind.
//! - [`ProjectStore`] appends completed results to a project's history.

pub mod error;
pub mod project_store;
pub mod task_log;
pub mod task_store;

pub use error::StoreError;
pub use project_store::ProjectStore;
pub use task_log::TaskLog;
pub use task_store::TaskStore;
