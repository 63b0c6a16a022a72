//! Observer events for delivery outcomes.
//!
//! The dispatcher and flush scheduler publish [`DispatchEvent`]s describing
//! what happened to each submitted event. Handlers subscribe through
//! [`EventHandler`]; the pipeline never waits on a handler outcome and a
//! failing handler must log locally rather than propagate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::EventKind;

/// Outcome notifications emitted by the delivery pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchEvent {
    /// An event reached its endpoint (first attempt or resend).
    Delivered(DeliveredEvent),

    /// An event failed its immediate attempt and was persisted for retry.
    Queued(QueuedEvent),

    /// An event was lost because persisting it failed.
    Dropped(DroppedEvent),

    /// A flush cycle finished issuing resends.
    FlushCompleted(FlushCompletedEvent),
}

/// Emitted when a send is confirmed by the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveredEvent {
    /// Channel the event was delivered on.
    pub kind: EventKind,

    /// HTTP status returned by the endpoint.
    pub status: u16,

    /// True when this delivery was a resend from the durable queue.
    pub resend: bool,

    /// When the delivery was confirmed.
    pub delivered_at: DateTime<Utc>,
}

/// Emitted when an event falls back to the durable queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEvent {
    /// Channel the event belongs to.
    pub kind: EventKind,

    /// Queue depth observed after the append.
    pub queue_depth: usize,

    /// Description of the send failure that caused queueing.
    pub error: String,

    /// When the event was appended.
    pub queued_at: DateTime<Utc>,
}

/// Emitted when an event is dropped after a failed save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedEvent {
    /// Channel the event belonged to.
    pub kind: EventKind,

    /// Description of the store failure.
    pub reason: String,

    /// When the drop occurred.
    pub dropped_at: DateTime<Utc>,
}

/// Emitted once per flush cycle, after all resends were issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushCompletedEvent {
    /// Number of resend attempts issued this cycle.
    pub resends_issued: usize,

    /// Whether the retry timer was armed when the cycle finished.
    pub timer_armed: bool,

    /// When the cycle finished.
    pub completed_at: DateTime<Utc>,
}

/// Subscriber side of the dispatch event stream.
///
/// Handlers must not block the pipeline; slow or failing handlers degrade
/// only their own observations.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles one dispatch event.
    async fn handle_event(&self, event: DispatchEvent);
}

/// Handler that discards all events.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

impl NoOpEventHandler {
    /// Creates a new no-op handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: DispatchEvent) {}
}

/// Fans each event out to every registered subscriber concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates a multicast handler with no subscribers.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Registers a subscriber.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: DispatchEvent) {
        let deliveries = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move { handler.handle_event(event).await }
        });
        futures::future::join_all(deliveries).await;
    }
}
