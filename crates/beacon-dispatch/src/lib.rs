//! Reliable at-least-once event delivery pipeline.
//!
//! Callers submit impression and conversion events for transmission to their
//! fixed endpoints. Every event is attempted immediately; failures fall back
//! to a durable per-kind FIFO queue drained by a timer-driven retry loop.
//!
//! # Architecture
//!
//! [`EventDispatcher`] issues the immediate attempt and owns the collaborators:
//! an [`EventStore`] (durable queues), a [`Transport`] (single network send),
//! and the flush scheduler — one serialized task that runs every flush cycle
//! and manages the retry timer as a function of queue occupancy.
//!
//! 1. **Dispatch** - immediate send; success triggers a catch-up flush,
//!    failure persists the event and arms the retry loop
//! 2. **Tick** - the armed timer requests a flush every poll interval
//! 3. **Flush** - snapshot both queues, resend everything, remove delivered
//!    heads, disarm the timer once both queues are empty
//!
//! Delivery is at-least-once: overlapping flush cycles may resend an event
//! that is already in flight. Duplicates are accepted; loss is not, except
//! on a failed save, which drops the event with a logged warning.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use beacon_core::{Event, EventKind};
//! use beacon_dispatch::{store::memory::InMemoryEventStore, DispatchConfig, EventDispatcher};
//!
//! # async fn example() -> beacon_dispatch::Result<()> {
//! let store = Arc::new(InMemoryEventStore::new());
//! let dispatcher = EventDispatcher::new(store, DispatchConfig::default())?;
//!
//! let event = Event::new().with("visitor_id", "v-42");
//! let outcome = dispatcher.dispatch(event, EventKind::Impression);
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod flush;
pub mod store;
pub mod transport;
mod timer;

// Re-export main public API
pub use config::{DispatchConfig, DEFAULT_DISPATCH_INTERVAL_MS, DEFAULT_DISPATCH_TIMEOUT_MS};
pub use dispatcher::{DispatchOutcome, DispatcherStats, EventDispatcher};
pub use error::{DispatchError, Result, TransportError};
pub use flush::FlushHandle;
pub use store::EventStore;
pub use transport::{HttpTransport, Transport, TransportReceipt};
