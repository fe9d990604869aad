//! EasyVideo progress broadcasting.
//!
//! - [`TaskBroadcaster`]: per-task publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`TaskEvent`]: one committed task transition, carrying the record.
//! - [`Subscription`]: a subscriber's handle; dropping it unsubscribes.

pub mod broadcaster;

pub use broadcaster::{RecvError, Subscription, TaskBroadcaster, TaskEvent};
