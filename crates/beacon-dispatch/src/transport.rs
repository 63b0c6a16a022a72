//! Network transport for event delivery.
//!
//! A [`Transport`] performs exactly one asynchronous send of one event's
//! payload to one URL. [`HttpTransport`] is the production implementation;
//! [`mock::MockTransport`] scripts outcomes for pipeline tests.

use std::{future::Future, pin::Pin, time::Duration};

use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::DispatchConfig,
    error::{DispatchError, TransportError},
};

/// Largest response body slice retained on a receipt or error.
const MAX_CAPTURED_BODY: usize = 1024;

/// Confirmation of a successful send.
#[derive(Debug, Clone)]
pub struct TransportReceipt {
    /// HTTP status returned by the endpoint (always 2xx).
    pub status: u16,
    /// Response body, truncated to a small audit slice.
    pub body: String,
    /// Total request duration.
    pub duration: Duration,
}

/// A single asynchronous network send.
///
/// Implementations must be safe for concurrent sends from multiple dispatch
/// and flush paths.
pub trait Transport: Send + Sync + 'static {
    /// Sends `payload` to `url`, resolving to a receipt or a categorized
    /// failure.
    fn send(
        &self,
        url: String,
        payload: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<TransportReceipt, TransportError>> + Send + '_>>;
}

/// HTTP transport delivering event payloads as JSON POST requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout_ms: Option<u64>,
}

impl HttpTransport {
    /// Builds the HTTP client from dispatcher configuration.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Configuration` if the client cannot be built.
    pub fn new(config: &DispatchConfig) -> Result<Self, DispatchError> {
        let mut builder = reqwest::Client::builder().user_agent(&config.user_agent);
        if let Some(timeout) = config.send_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| DispatchError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout_ms: config.send_timeout().map(|t| t.as_millis() as u64) })
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        url: String,
        payload: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<TransportReceipt, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let started = std::time::Instant::now();
            let dispatch_id = Uuid::new_v4();

            debug!(%url, %dispatch_id, bytes = payload.len(), "sending event payload");

            let response = self
                .client
                .post(&url)
                .header("content-type", "application/json")
                .header("x-beacon-dispatch-id", dispatch_id.to_string())
                .header("x-beacon-sent-at", chrono::Utc::now().to_rfc3339())
                .body(payload)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        TransportError::timeout(self.timeout_ms.unwrap_or_default())
                    } else if e.is_connect() {
                        TransportError::network(format!("connection failed: {e}"))
                    } else {
                        TransportError::network(e.to_string())
                    }
                })?;

            let status = response.status().as_u16();
            let is_success = response.status().is_success();
            let body = capture_body(response).await;
            let duration = started.elapsed();

            if is_success {
                debug!(%url, status, duration_ms = duration.as_millis(), "event delivered");
                Ok(TransportReceipt { status, body, duration })
            } else {
                warn!(%url, status, duration_ms = duration.as_millis(), "endpoint rejected event");
                Err(TransportError::http_status(status, body))
            }
        })
    }
}

/// Reads the response body, truncated to the audit slice.
async fn capture_body(response: reqwest::Response) -> String {
    match response.bytes().await {
        Ok(bytes) => {
            if bytes.len() > MAX_CAPTURED_BODY {
                let suffix = "... (truncated)";
                let head = String::from_utf8_lossy(&bytes[..MAX_CAPTURED_BODY - suffix.len()]);
                format!("{head}{suffix}")
            } else {
                String::from_utf8_lossy(&bytes).into_owned()
            }
        },
        Err(e) => format!("[failed to read response body: {e}]"),
    }
}

pub mod mock {
    //! Scripted transport for deterministic pipeline tests.

    use std::{
        collections::VecDeque,
        future::Future,
        pin::Pin,
        sync::Arc,
        time::Duration,
    };

    use bytes::Bytes;
    use tokio::sync::Mutex;

    use super::{Transport, TransportReceipt};
    use crate::error::TransportError;

    /// One scripted send result.
    pub type SendOutcome = Result<TransportReceipt, TransportError>;

    /// A send observed by the mock, for verification.
    #[derive(Debug, Clone)]
    pub struct RecordedSend {
        /// Destination URL of the send.
        pub url: String,
        /// Payload bytes handed to the transport.
        pub payload: Bytes,
    }

    /// Transport double with a scripted outcome queue.
    ///
    /// Each send consumes the next scripted outcome; when the script runs
    /// dry the configured default outcome applies. The default default is
    /// success with HTTP 200.
    #[derive(Debug)]
    pub struct MockTransport {
        script: Mutex<VecDeque<SendOutcome>>,
        default_outcome: Mutex<SendOutcome>,
        sent: Arc<Mutex<Vec<RecordedSend>>>,
    }

    impl MockTransport {
        /// Creates a mock whose sends all succeed with HTTP 200.
        pub fn new() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                default_outcome: Mutex::new(Ok(ok_receipt())),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Creates a mock whose sends all fail with a network error.
        pub fn failing() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                default_outcome: Mutex::new(Err(TransportError::network("connection refused"))),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Queues one scripted outcome, consumed by the next send.
        pub async fn enqueue_outcome(&self, outcome: SendOutcome) {
            self.script.lock().await.push_back(outcome);
        }

        /// Replaces the fallback outcome used when the script is empty.
        pub async fn set_default_outcome(&self, outcome: SendOutcome) {
            *self.default_outcome.lock().await = outcome;
        }

        /// All sends observed so far, in arrival order.
        pub async fn sent(&self) -> Vec<RecordedSend> {
            self.sent.lock().await.clone()
        }

        /// Number of sends observed so far.
        pub async fn send_count(&self) -> usize {
            self.sent.lock().await.len()
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    /// A plain 200 receipt for scripted successes.
    pub fn ok_receipt() -> TransportReceipt {
        TransportReceipt { status: 200, body: "OK".to_string(), duration: Duration::from_millis(1) }
    }

    impl Transport for MockTransport {
        fn send(
            &self,
            url: String,
            payload: Bytes,
        ) -> Pin<Box<dyn Future<Output = Result<TransportReceipt, TransportError>> + Send + '_>>
        {
            Box::pin(async move {
                self.sent.lock().await.push(RecordedSend { url, payload });
                match self.script.lock().await.pop_front() {
                    Some(outcome) => outcome,
                    None => self.default_outcome.lock().await.clone(),
                }
            })
        }
    }
}
