//! Cancelable repeating retry timer.
//!
//! Each armed timer is one spawned task ticking through [`Clock::sleep`] and
//! enqueueing a flush command per tick. Arm/disarm happen only on the flush
//! scheduler task; other contexts marshal timer requests through the
//! scheduler's command channel.

use std::{sync::Arc, time::Duration};

use beacon_core::Clock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::flush::FlushCommand;

/// A live repeating timer driving the retry loop.
#[derive(Debug)]
pub(crate) struct RetryTimer {
    interval: Duration,
    cancel: CancellationToken,
}

impl RetryTimer {
    /// Spawns a tick task sending one flush command every `interval`.
    ///
    /// The task exits when the timer is disarmed or the scheduler's command
    /// channel closes.
    pub(crate) fn spawn(
        interval: Duration,
        clock: Arc<dyn Clock>,
        ticks: mpsc::UnboundedSender<FlushCommand>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = clock.sleep(interval) => {
                        if ticks.send(FlushCommand::Flush { done: None }).is_err() {
                            break;
                        }
                    }
                    () = task_cancel.cancelled() => break,
                }
            }
            debug!(interval_ms = interval.as_millis(), "retry timer stopped");
        });

        Self { interval, cancel }
    }

    /// Cancels the tick task. Idempotent.
    pub(crate) fn disarm(&self) {
        self.cancel.cancel();
    }

    /// Interval this timer was armed with.
    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    /// True once the timer has been disarmed.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
