//! Application lifecycle trigger points.
//!
//! The host process reports lifecycle transitions to the dispatcher through
//! this explicit interface instead of any OS notification mechanism. Only a
//! subset of signals affects the queue; the rest are observed for logging.

use std::fmt;

/// A lifecycle transition reported by the host process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// Process finished launching.
    Launch,
    /// Process moved to the background.
    EnterBackground,
    /// Process is about to terminate.
    WillTerminate,
    /// Process became active.
    BecomeActive,
    /// Process is about to resign active.
    ResignActive,
    /// Process returned to the foreground.
    EnterForeground,
}

impl LifecycleSignal {
    /// Whether this signal triggers a queue flush.
    ///
    /// `WillTerminate` additionally waits (best effort) for the flush cycle
    /// to be issued before returning control to the host.
    pub const fn triggers_flush(self) -> bool {
        matches!(self, Self::Launch | Self::EnterBackground | Self::WillTerminate)
    }

    /// Stable name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::EnterBackground => "enter_background",
            Self::WillTerminate => "will_terminate",
            Self::BecomeActive => "become_active",
            Self::ResignActive => "resign_active",
            Self::EnterForeground => "enter_foreground",
        }
    }
}

impl fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
