//! Delivery layer — ships composed payloads to the collection endpoint.
//! Dispatch is fire-and-forget through a single FIFO worker so request
//! order matches composition order; outbound-link and file-download events
//! use a bounded wait so the user's navigation is never delayed more than
//! [`NAVIGATION_DELAY_CAP`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_core::{PulseError, PulseResult};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Upper bound on how long a user-initiated navigation may wait for a
/// delivery attempt to settle.
pub const NAVIGATION_DELAY_CAP: Duration = Duration::from_secs(5);

/// Outcome reported to the optional per-event callback. A non-2xx response
/// is surfaced as `Completed` with its status; it is never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Completed { status: u16 },
    Failed { error: String },
}

pub type DeliveryCallback = Arc<dyn Fn(DeliveryResult) + Send + Sync>;

/// Transport over which payload bodies reach the endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, endpoint: &str, body: String) -> PulseResult<u16>;
}

/// Primary transport: a keep-alive HTTP client. The request is owned by
/// the worker task, not the caller, so it survives the caller moving on —
/// the keep-alive analogue for an engine that outlives its initiator.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> PulseResult<Self> {
        let client = reqwest::Client::builder()
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| PulseError::Delivery(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &str, body: String) -> PulseResult<u16> {
        let response = self
            .client
            .post(endpoint)
            // text/plain keeps the request CORS-simple (no preflight).
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .map_err(|e| PulseError::Delivery(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Legacy fallback for environments without keep-alive support: a
/// synchronous-capable client driven off the async runtime.
pub struct LegacyTransport;

#[async_trait]
impl Transport for LegacyTransport {
    async fn send(&self, endpoint: &str, body: String) -> PulseResult<u16> {
        let endpoint = endpoint.to_string();
        let handle = tokio::task::spawn_blocking(move || {
            let client = reqwest::blocking::Client::new();
            client
                .post(&endpoint)
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(body)
                .send()
                .map(|r| r.status().as_u16())
                .map_err(|e| PulseError::Delivery(e.to_string()))
        });
        handle
            .await
            .map_err(|e| PulseError::Delivery(e.to_string()))?
    }
}

/// In-memory transport for tests: records every body in send order and
/// answers a fixed status.
pub struct CaptureTransport {
    sent: Mutex<Vec<String>>,
    status: u16,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self::with_status(202)
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            status,
        }
    }

    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Default for CaptureTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for CaptureTransport {
    async fn send(&self, _endpoint: &str, body: String) -> PulseResult<u16> {
        self.sent.lock().push(body);
        Ok(self.status)
    }
}

struct DeliveryJob {
    /// `None` is a flush marker: nothing is sent, the `done` channel just
    /// observes that every earlier job has settled.
    body: Option<serde_json::Value>,
    callback: Option<DeliveryCallback>,
    done: Option<oneshot::Sender<()>>,
}

/// FIFO delivery front-end. Requests are processed by a dedicated worker
/// task in dispatch order; failures are reported only through the optional
/// callback and never retried.
pub struct DeliveryLayer {
    tx: mpsc::UnboundedSender<DeliveryJob>,
}

impl DeliveryLayer {
    /// Spawns the delivery worker on the current tokio runtime. Without a
    /// runtime the layer is inert and every dispatch is dropped with a
    /// warning.
    pub fn new(transport: Arc<dyn Transport>, endpoint: String) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(Self::worker(transport, endpoint, rx));
            }
            Err(_) => {
                warn!("no async runtime available; event delivery is disabled");
            }
        }
        Self { tx }
    }

    async fn worker(
        transport: Arc<dyn Transport>,
        endpoint: String,
        mut rx: mpsc::UnboundedReceiver<DeliveryJob>,
    ) {
        while let Some(job) = rx.recv().await {
            if let Some(body) = job.body {
                let result = match transport.send(&endpoint, body.to_string()).await {
                    Ok(status) => {
                        if !(200..300).contains(&status) {
                            warn!(status, "collection endpoint answered non-2xx");
                        } else {
                            debug!(status, "event delivered");
                        }
                        DeliveryResult::Completed { status }
                    }
                    Err(e) => {
                        warn!(error = %e, "event delivery failed");
                        DeliveryResult::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                if let Some(callback) = job.callback {
                    callback(result);
                }
            }
            if let Some(done) = job.done {
                let _ = done.send(());
            }
        }
    }

    /// Fire-and-forget dispatch. The engine never awaits the request; a
    /// navigation mid-flight simply lets it finish in the background.
    pub fn dispatch(&self, body: serde_json::Value, callback: Option<DeliveryCallback>) {
        let job = DeliveryJob {
            body: Some(body),
            callback,
            done: None,
        };
        if self.tx.send(job).is_err() {
            warn!("delivery worker is gone; event dropped");
        }
    }

    /// Dispatch and wait until the attempt settles or the navigation delay
    /// cap elapses, whichever comes first. The request itself continues
    /// either way.
    pub async fn dispatch_bounded(
        &self,
        body: serde_json::Value,
        callback: Option<DeliveryCallback>,
    ) {
        let (done_tx, done_rx) = oneshot::channel();
        let job = DeliveryJob {
            body: Some(body),
            callback,
            done: Some(done_tx),
        };
        if self.tx.send(job).is_err() {
            warn!("delivery worker is gone; event dropped");
            return;
        }
        let _ = tokio::time::timeout(NAVIGATION_DELAY_CAP, done_rx).await;
    }

    /// Wait for every previously dispatched job to settle. Test hook.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        let job = DeliveryJob {
            body: None,
            callback: None,
            done: Some(done_tx),
        };
        if self.tx.send(job).is_ok() {
            let _ = done_rx.await;
        }
    }
}
