//! `tempo-notify`: fire-and-forget start/stop commands for workers.
//!
//! Channels are named after a worker's client name. Delivery is at most
//! once: a message published while nobody listens is dropped.

pub mod error;
pub mod publisher;
pub mod signal;

pub use error::{NotifyError, Result};
pub use publisher::{NotificationPublisher, DEFAULT_CHANNEL_CAPACITY};
pub use signal::{ChainSignal, SignalCommand};
