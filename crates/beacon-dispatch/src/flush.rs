//! Serialized retry loop draining the durable queues.
//!
//! All flush triggers (post-success catch-up, timer tick, lifecycle signal,
//! manual flush) funnel into one command channel consumed by a single
//! scheduler task, so no two flush cycles ever run concurrently. The
//! scheduler task is also the only place the retry timer is armed or
//! disarmed; callers on other tasks marshal timer requests through the same
//! channel.
//!
//! Resend attempts issued inside a cycle are fire-and-forget: the cycle
//! completes once all attempts are in flight, and their completions resolve
//! against whatever queue state exists by then. A later cycle can overlap
//! those completions, so the same queued event may be resent twice. That is
//! the accepted at-least-once model; removal is always "current head of
//! queue", which makes stale completions harmless no-ops.

use std::sync::Arc;

use beacon_core::{
    Clock, DeliveredEvent, DispatchEvent, EventHandler, EventKind, FlushCompletedEvent,
};
use tokio::{
    sync::{mpsc, oneshot, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    config::DispatchConfig, dispatcher::DispatcherStats, store::EventStore, timer::RetryTimer,
    transport::Transport,
};

/// Commands accepted by the scheduler task.
#[derive(Debug)]
pub(crate) enum FlushCommand {
    /// Run one flush cycle; `done` resolves when the cycle has issued all
    /// its resends (not when those resends settle).
    Flush { done: Option<oneshot::Sender<()>> },
    /// Arm the retry timer if it is not already armed. Never resets the
    /// phase of a valid timer.
    EnsureArmed,
    /// Disarm the retry timer if both queues are observed empty.
    DisarmIfIdle,
    /// Report whether the retry timer is currently armed.
    QueryArmed { reply: oneshot::Sender<bool> },
}

/// Cloneable capability to trigger flushes and query timer state.
#[derive(Debug, Clone)]
pub struct FlushHandle {
    commands: mpsc::UnboundedSender<FlushCommand>,
}

impl FlushHandle {
    /// Requests a flush cycle without waiting for it.
    pub fn request_flush(&self) {
        let _ = self.commands.send(FlushCommand::Flush { done: None });
    }

    /// Requests a flush cycle and waits until it has issued all resends.
    ///
    /// Returns immediately if the scheduler has shut down.
    pub async fn flush_and_wait(&self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(FlushCommand::Flush { done: Some(done) }).is_ok() {
            let _ = finished.await;
        }
    }

    /// Whether the retry timer is currently armed.
    ///
    /// Returns `false` if the scheduler has shut down.
    pub async fn timer_armed(&self) -> bool {
        let (reply, answer) = oneshot::channel();
        if self.commands.send(FlushCommand::QueryArmed { reply }).is_err() {
            return false;
        }
        answer.await.unwrap_or(false)
    }

    /// Requests that the timer be armed (marshalled onto the scheduler).
    pub(crate) fn ensure_armed(&self) {
        let _ = self.commands.send(FlushCommand::EnsureArmed);
    }
}

/// The single serialized consumer behind all flush triggers.
///
/// Owns the retry timer and the drain/disarm decision; constructed once per
/// dispatcher and shut down through its cancellation token.
pub struct FlushScheduler {
    store: Arc<dyn EventStore>,
    transport: Arc<dyn Transport>,
    config: DispatchConfig,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventHandler>,
    stats: Arc<RwLock<DispatcherStats>>,
    commands: mpsc::UnboundedReceiver<FlushCommand>,
    ticks: mpsc::UnboundedSender<FlushCommand>,
    timer: Option<RetryTimer>,
    cancel: CancellationToken,
}

impl FlushScheduler {
    /// Spawns the scheduler task and returns its handle pair.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn(
        store: Arc<dyn EventStore>,
        transport: Arc<dyn Transport>,
        config: DispatchConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventHandler>,
        stats: Arc<RwLock<DispatcherStats>>,
        cancel: CancellationToken,
    ) -> (FlushHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            store,
            transport,
            config,
            clock,
            events,
            stats,
            commands: rx,
            ticks: tx.clone(),
            timer: None,
            cancel,
        };

        let task = tokio::spawn(scheduler.run());
        (FlushHandle { commands: tx }, task)
    }

    async fn run(mut self) {
        let cancel = self.cancel.clone();
        loop {
            let command = tokio::select! {
                () = cancel.cancelled() => None,
                command = self.commands.recv() => command,
            };
            let Some(command) = command else { break };
            self.handle(command).await;
        }
        self.disarm_timer();
        debug!("flush scheduler stopped");
    }

    async fn handle(&mut self, command: FlushCommand) {
        match command {
            FlushCommand::Flush { done } => {
                self.run_cycle().await;
                if let Some(done) = done {
                    let _ = done.send(());
                }
            },
            FlushCommand::EnsureArmed => self.ensure_armed(),
            FlushCommand::DisarmIfIdle => {
                if self.queues_empty().await {
                    self.disarm_timer();
                }
            },
            FlushCommand::QueryArmed { reply } => {
                let _ = reply.send(self.is_armed());
            },
        }
    }

    /// One flush cycle: occupancy check, timer upkeep, resend fan-out.
    async fn run_cycle(&mut self) {
        let mut queued_total = 0usize;
        for kind in EventKind::ALL {
            match self.store.count(kind).await {
                Ok(count) => queued_total += count,
                Err(error) => {
                    // Occupancy unknown; leave the timer as it is and let a
                    // later cycle retry.
                    warn!(kind = %kind, error = %error, "queue count failed, skipping flush cycle");
                    return;
                },
            }
        }

        if queued_total == 0 {
            self.disarm_timer();
            self.finish_cycle(0).await;
            return;
        }

        self.ensure_armed();

        let mut issued = 0usize;
        for kind in EventKind::ALL {
            let snapshot = match self.store.list_all(kind).await {
                Ok(events) => events,
                Err(error) => {
                    warn!(kind = %kind, error = %error, "queue read failed, kind skipped this cycle");
                    continue;
                },
            };

            debug!(kind = %kind, queued = snapshot.len(), "resending queued events");
            for event in snapshot {
                self.spawn_resend(event, kind);
                issued += 1;
            }
        }

        self.finish_cycle(issued).await;
    }

    async fn finish_cycle(&self, resends_issued: usize) {
        self.stats.write().await.flush_cycles += 1;
        self.events
            .handle_event(DispatchEvent::FlushCompleted(FlushCompletedEvent {
                resends_issued,
                timer_armed: self.is_armed(),
                completed_at: self.clock.now_utc(),
            }))
            .await;
    }

    /// Issues one resend without awaiting its completion.
    ///
    /// The completion removes the current queue head on success (never a
    /// named event) and marshals any timer change back onto the scheduler.
    fn spawn_resend(&self, event: beacon_core::Event, kind: EventKind) {
        let transport = self.transport.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        let stats = self.stats.clone();
        let clock = self.clock.clone();
        let ticks = self.ticks.clone();
        let url = self.config.url_for(kind).to_string();

        tokio::spawn(async move {
            match transport.send(url, event.to_bytes()).await {
                Ok(receipt) => {
                    if let Err(error) = store.remove_oldest(kind).await {
                        warn!(kind = %kind, error = %error, "queue head removal failed after resend");
                        return;
                    }
                    stats.write().await.resent += 1;
                    events
                        .handle_event(DispatchEvent::Delivered(DeliveredEvent {
                            kind,
                            status: receipt.status,
                            resend: true,
                            delivered_at: clock.now_utc(),
                        }))
                        .await;

                    let mut drained = true;
                    for queue in EventKind::ALL {
                        // A count failure here just postpones the disarm to a
                        // later cycle.
                        if store.count(queue).await.map_or(true, |count| count > 0) {
                            drained = false;
                            break;
                        }
                    }
                    if drained {
                        let _ = ticks.send(FlushCommand::DisarmIfIdle);
                    }
                },
                Err(error) => {
                    debug!(kind = %kind, error = %error, "resend failed, event stays queued");
                    let _ = ticks.send(FlushCommand::EnsureArmed);
                },
            }
        });
    }

    fn ensure_armed(&mut self) {
        if !self.config.retry_enabled() {
            return;
        }
        if self.is_armed() {
            return;
        }
        // Replace a cancelled or mismatched timer; a valid one was kept above.
        self.disarm_timer();

        if let Some(interval) = self.config.retry_interval() {
            self.timer = Some(RetryTimer::spawn(interval, self.clock.clone(), self.ticks.clone()));
            debug!(interval_ms = interval.as_millis(), "retry timer armed");
        }
    }

    fn disarm_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.disarm();
            debug!("retry timer disarmed");
        }
    }

    fn is_armed(&self) -> bool {
        self.config.dispatch_timeout_ms > 0
            && self
                .timer
                .as_ref()
                .is_some_and(|timer| {
                    !timer.is_cancelled() && Some(timer.interval()) == self.config.retry_interval()
                })
    }

    async fn queues_empty(&self) -> bool {
        for kind in EventKind::ALL {
            match self.store.count(kind).await {
                Ok(0) => {},
                // Non-empty or unknown both keep the timer armed.
                Ok(_) | Err(_) => return false,
            }
        }
        true
    }
}
