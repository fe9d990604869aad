//! Client for the external AI generation service.
//!
//! The service accepts generation jobs over HTTP and reports their progress
//! on a polling endpoint. [`GenerationService`] is the seam the task
//! orchestrator drives; [`GenerationApi`] is the `reqwest` implementation.

pub mod api;
pub mod messages;
pub mod service;

pub use api::{GenerationApi, GenerationError};
pub use messages::{PollReport, RemoteStatus, SubmitAccepted};
pub use service::GenerationService;
