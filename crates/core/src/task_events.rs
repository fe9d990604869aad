//! Event type names for task lifecycle notifications.
//!
//! Used as the `event_type` of broadcast events and as the SSE event name
//! sent to browser clients.

/// The first event on a stream: the task record as it was at subscription.
pub const EVENT_SNAPSHOT: &str = "snapshot";

/// Any committed transition after the snapshot.
pub const EVENT_UPDATE: &str = "update";

/// The subscribed task does not exist; the stream ends after this event.
pub const EVENT_ERROR: &str = "error";
