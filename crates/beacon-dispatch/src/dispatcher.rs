//! Event dispatcher: immediate send, durable fallback, catch-up flushing.
//!
//! [`EventDispatcher`] owns the store, the transport, and the flush
//! scheduler; the scheduler holds only channel capabilities back into the
//! pipeline, never a reference to the dispatcher. The serialized flush
//! context is created once at construction and torn down by [`shutdown`].
//!
//! [`shutdown`]: EventDispatcher::shutdown

use std::sync::Arc;

use beacon_core::{
    Clock, DeliveredEvent, DispatchEvent, DroppedEvent, Event, EventHandler, EventKind,
    LifecycleSignal, NoOpEventHandler, QueuedEvent, RealClock,
};
use tokio::{
    sync::{oneshot, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::DispatchConfig,
    error::{DispatchError, Result, TransportError},
    flush::{FlushHandle, FlushScheduler},
    store::EventStore,
    transport::{HttpTransport, Transport, TransportReceipt},
};

/// Counters for dispatcher monitoring.
#[derive(Debug, Clone, Default)]
pub struct DispatcherStats {
    /// Total `dispatch` calls accepted.
    pub dispatched: u64,
    /// Events delivered on their immediate attempt.
    pub delivered_first_attempt: u64,
    /// Events persisted after a failed immediate attempt.
    pub queued: u64,
    /// Events lost because persisting them failed.
    pub dropped: u64,
    /// Queued events delivered by the retry loop.
    pub resent: u64,
    /// Flush cycles completed.
    pub flush_cycles: u64,
}

/// Result of one `dispatch` call's immediate attempt.
///
/// Resolves exactly once per dispatch and never reflects later retry
/// outcomes; those report only through the flush completion path.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The immediate attempt succeeded.
    Delivered(TransportReceipt),
    /// The immediate attempt failed. `queued` records whether the event
    /// reached the durable queue or was dropped on a failed save.
    Failed {
        /// The transport failure of the immediate attempt.
        error: TransportError,
        /// True when the event was persisted for retry.
        queued: bool,
    },
}

impl DispatchOutcome {
    /// True for an immediate delivery.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Orchestrates immediate send attempts, persistence on failure, and
/// opportunistic catch-up flushing.
pub struct EventDispatcher {
    store: Arc<dyn EventStore>,
    transport: Arc<dyn Transport>,
    config: DispatchConfig,
    flush: FlushHandle,
    scheduler: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    stats: Arc<RwLock<DispatcherStats>>,
    events: Arc<dyn EventHandler>,
    clock: Arc<dyn Clock>,
}

impl EventDispatcher {
    /// Creates a dispatcher with the production HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(store: Arc<dyn EventStore>, config: DispatchConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_parts(store, transport, config, Arc::new(RealClock), Arc::new(NoOpEventHandler))
    }

    /// Creates a dispatcher with injected transport, clock, and observer.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn with_parts(
        store: Arc<dyn EventStore>,
        transport: Arc<dyn Transport>,
        config: DispatchConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventHandler>,
    ) -> Result<Self> {
        config.validate()?;
        config.log_warnings();

        let stats = Arc::new(RwLock::new(DispatcherStats::default()));
        let cancel = CancellationToken::new();
        let (flush, scheduler) = FlushScheduler::spawn(
            store.clone(),
            transport.clone(),
            config.clone(),
            clock.clone(),
            events.clone(),
            stats.clone(),
            cancel.clone(),
        );

        Ok(Self {
            store,
            transport,
            config,
            flush,
            scheduler: Some(scheduler),
            cancel,
            stats,
            events,
            clock,
        })
    }

    /// Submits one event for delivery on the given channel.
    ///
    /// Returns before the network operation completes; the receiver resolves
    /// exactly once with the outcome of the immediate attempt. On success a
    /// catch-up flush of both queues is triggered asynchronously; its result
    /// does not affect the returned outcome. On failure the event is
    /// persisted for retry, or dropped with a logged warning if the save
    /// itself fails.
    pub fn dispatch(&self, event: Event, kind: EventKind) -> oneshot::Receiver<DispatchOutcome> {
        let (reply, outcome) = oneshot::channel();

        let store = self.store.clone();
        let transport = self.transport.clone();
        let flush = self.flush.clone();
        let stats = self.stats.clone();
        let events = self.events.clone();
        let clock = self.clock.clone();
        let url = self.config.url_for(kind).to_string();

        tokio::spawn(async move {
            stats.write().await.dispatched += 1;

            match transport.send(url, event.to_bytes()).await {
                Ok(receipt) => {
                    stats.write().await.delivered_first_attempt += 1;
                    debug!(kind = %kind, status = receipt.status, "event delivered");
                    events
                        .handle_event(DispatchEvent::Delivered(DeliveredEvent {
                            kind,
                            status: receipt.status,
                            resend: false,
                            delivered_at: clock.now_utc(),
                        }))
                        .await;

                    let _ = reply.send(DispatchOutcome::Delivered(receipt));
                    // Catch up on anything queued earlier, on either channel.
                    flush.request_flush();
                },
                Err(error) => match store.save(event, kind).await {
                    Ok(()) => {
                        stats.write().await.queued += 1;
                        let queue_depth = store.count(kind).await.unwrap_or(0);
                        warn!(kind = %kind, error = %error, queue_depth, "send failed, event queued for retry");
                        events
                            .handle_event(DispatchEvent::Queued(QueuedEvent {
                                kind,
                                queue_depth,
                                error: error.to_string(),
                                queued_at: clock.now_utc(),
                            }))
                            .await;

                        flush.ensure_armed();
                        let _ = reply.send(DispatchOutcome::Failed { error, queued: true });
                    },
                    Err(save_error) => {
                        // No fallback exists for a failed save: the event is
                        // gone once this warning is written.
                        stats.write().await.dropped += 1;
                        warn!(kind = %kind, error = %save_error, "event store save failed, dropping event");
                        events
                            .handle_event(DispatchEvent::Dropped(DroppedEvent {
                                kind,
                                reason: save_error.to_string(),
                                dropped_at: clock.now_utc(),
                            }))
                            .await;

                        let _ = reply.send(DispatchOutcome::Failed { error, queued: false });
                    },
                },
            }
        });

        outcome
    }

    /// Triggers a flush cycle without waiting for it.
    pub fn flush(&self) {
        self.flush.request_flush();
    }

    /// Triggers a flush cycle and waits until all its resends were issued.
    pub async fn flush_and_wait(&self) {
        self.flush.flush_and_wait().await;
    }

    /// Whether the retry timer is currently armed.
    pub async fn timer_armed(&self) -> bool {
        self.flush.timer_armed().await
    }

    /// Consumes a lifecycle transition reported by the host process.
    ///
    /// `Launch` and `EnterBackground` trigger a flush; `WillTerminate`
    /// additionally waits (bounded by the shutdown timeout) for the flush
    /// cycle to be issued. The remaining signals are logged only.
    pub async fn handle_lifecycle(&self, signal: LifecycleSignal) {
        match signal {
            LifecycleSignal::Launch | LifecycleSignal::EnterBackground => {
                info!(signal = %signal, "lifecycle flush triggered");
                self.flush.request_flush();
            },
            LifecycleSignal::WillTerminate => {
                info!(signal = %signal, "best-effort flush before termination");
                if tokio::time::timeout(self.config.shutdown_timeout(), self.flush_and_wait())
                    .await
                    .is_err()
                {
                    warn!(signal = %signal, "termination flush did not complete in time");
                }
            },
            LifecycleSignal::BecomeActive
            | LifecycleSignal::ResignActive
            | LifecycleSignal::EnterForeground => {
                debug!(signal = %signal, "lifecycle signal observed");
            },
        }
    }

    /// Current counter snapshot.
    pub async fn stats(&self) -> DispatcherStats {
        self.stats.read().await.clone()
    }

    /// The dispatcher's configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Gracefully shuts down the flush scheduler and its timer.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::ShutdownTimeout` if the scheduler does not
    /// stop within the configured deadline.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down event dispatcher");
        self.cancel.cancel();

        if let Some(scheduler) = self.scheduler.take() {
            let timeout = self.config.shutdown_timeout();
            if tokio::time::timeout(timeout, scheduler).await.is_err() {
                return Err(DispatchError::ShutdownTimeout { timeout });
            }
        }
        Ok(())
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        if self.scheduler.is_some() && !self.cancel.is_cancelled() {
            self.cancel.cancel();
            warn!("event dispatcher dropped without shutdown, cancelling scheduler");
        }
    }
}
