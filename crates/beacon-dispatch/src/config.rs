//! Dispatcher configuration with defaults, file, and environment overrides.
//!
//! Configuration is loaded in priority order: environment variables
//! (`BEACON_*`, highest), the `beacon.toml` file, then built-in defaults.
//! Degenerate interval/timeout values are not errors: they log a warning and
//! disable retry scheduling, leaving immediate-attempt dispatch intact.

use std::time::Duration;

use anyhow::Context;
use beacon_core::EventKind;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DispatchError, Result};

const CONFIG_FILE: &str = "beacon.toml";

/// Default polling interval for the retry loop, in milliseconds.
pub const DEFAULT_DISPATCH_INTERVAL_MS: i64 = 1_000;

/// Default overall dispatch timeout, in milliseconds.
pub const DEFAULT_DISPATCH_TIMEOUT_MS: i64 = 10_000;

/// Configuration for the event dispatcher and its retry loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Retry poll interval in milliseconds.
    ///
    /// Values `<= 0` disable retry scheduling entirely; queued events are
    /// then drained only by explicit flush triggers.
    /// Environment variable: `BEACON_DISPATCH_INTERVAL_MS`
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: i64,

    /// Overall dispatch timeout in milliseconds.
    ///
    /// Bounds a single send and, together with the interval, yields the
    /// informational retry budget. Values `<= 0` log a warning.
    /// Environment variable: `BEACON_DISPATCH_TIMEOUT_MS`
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: i64,

    /// Destination URL for impression events.
    ///
    /// Environment variable: `BEACON_IMPRESSION_URL`
    #[serde(default = "default_impression_url")]
    pub impression_url: String,

    /// Destination URL for conversion events.
    ///
    /// Environment variable: `BEACON_CONVERSION_URL`
    #[serde(default = "default_conversion_url")]
    pub conversion_url: String,

    /// User agent sent with every delivery request.
    ///
    /// Environment variable: `BEACON_USER_AGENT`
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum time to wait for the scheduler during graceful shutdown,
    /// in milliseconds.
    ///
    /// Environment variable: `BEACON_SHUTDOWN_TIMEOUT_MS`
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl DispatchConfig {
    /// Loads configuration from defaults, `beacon.toml`, and `BEACON_*`
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns error when a source cannot be parsed or a destination URL is
    /// invalid. Degenerate interval/timeout values are logged, not raised.
    pub fn load() -> anyhow::Result<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("BEACON_"))
            .extract()
            .context("failed to load dispatcher configuration")?;

        config.validate()?;
        config.log_warnings();
        Ok(config)
    }

    /// Validates the hard requirements: both destination URLs must parse.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Configuration` for an unparseable URL.
    pub fn validate(&self) -> Result<()> {
        for (name, url) in
            [("impression_url", &self.impression_url), ("conversion_url", &self.conversion_url)]
        {
            reqwest::Url::parse(url)
                .map_err(|e| DispatchError::configuration(format!("{name} `{url}`: {e}")))?;
        }
        Ok(())
    }

    /// Logs the non-fatal degradations implied by this configuration.
    pub fn log_warnings(&self) {
        if self.dispatch_interval_ms <= 0 {
            warn!(
                dispatch_interval_ms = self.dispatch_interval_ms,
                "non-positive dispatch interval, retry scheduling disabled"
            );
        }
        if self.dispatch_timeout_ms <= 0 {
            warn!(
                dispatch_timeout_ms = self.dispatch_timeout_ms,
                "non-positive dispatch timeout, retry scheduling disabled"
            );
        }
        if let Some(budget) = self.max_backoff_retries() {
            debug!(max_backoff_retries = budget, "retry budget derived from timeout/interval");
        }
    }

    /// True when the retry timer may be armed at all.
    pub fn retry_enabled(&self) -> bool {
        self.dispatch_interval_ms > 0 && self.dispatch_timeout_ms > 0
    }

    /// Retry poll interval, or `None` when scheduling is disabled.
    pub fn retry_interval(&self) -> Option<Duration> {
        (self.dispatch_interval_ms > 0)
            .then(|| Duration::from_millis(self.dispatch_interval_ms.unsigned_abs()))
    }

    /// Per-send timeout, or `None` when the timeout is non-positive.
    pub fn send_timeout(&self) -> Option<Duration> {
        (self.dispatch_timeout_ms > 0)
            .then(|| Duration::from_millis(self.dispatch_timeout_ms.unsigned_abs()))
    }

    /// Informational retry budget: how many poll ticks fit in the timeout.
    ///
    /// Not enforced as a hard cutoff anywhere in the pipeline.
    pub fn max_backoff_retries(&self) -> Option<i64> {
        (self.retry_enabled()).then(|| self.dispatch_timeout_ms / self.dispatch_interval_ms)
    }

    /// Graceful shutdown deadline.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Destination URL for the given event kind.
    pub fn url_for(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Impression => &self.impression_url,
            EventKind::Conversion => &self.conversion_url,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: default_dispatch_interval_ms(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            impression_url: default_impression_url(),
            conversion_url: default_conversion_url(),
            user_agent: default_user_agent(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

fn default_dispatch_interval_ms() -> i64 {
    DEFAULT_DISPATCH_INTERVAL_MS
}

fn default_dispatch_timeout_ms() -> i64 {
    DEFAULT_DISPATCH_TIMEOUT_MS
}

fn default_impression_url() -> String {
    "https://events.beacon.dev/v1/impression".to_string()
}

fn default_conversion_url() -> String {
    "https://events.beacon.dev/v1/conversion".to_string()
}

fn default_user_agent() -> String {
    "Beacon-Dispatch/0.1".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}
