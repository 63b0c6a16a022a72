//! Core domain types for the beacon event delivery pipeline.
//!
//! Provides the event model, the durable-store error taxonomy, the clock
//! abstraction used for testable timing, observer events for delivery
//! outcomes, and the lifecycle signal interface the host process calls into.
//! The delivery crate depends on these foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod lifecycle;
pub mod models;
pub mod time;

pub use error::StoreError;
pub use events::{
    DeliveredEvent, DispatchEvent, DroppedEvent, EventHandler, FlushCompletedEvent,
    MulticastEventHandler, NoOpEventHandler, QueuedEvent,
};
pub use lifecycle::LifecycleSignal;
pub use models::{Event, EventKind};
pub use time::{Clock, RealClock, TestClock};
