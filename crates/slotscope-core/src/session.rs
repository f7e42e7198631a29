//! Capture session: lifecycle, correlation, and bounded delivery.
//!
//! One session orchestrates a proxy adapter, a screenshot manager, and
//! a broker client for a single capture run. Intercepted events are
//! correlated into [`CaptureRecord`]s, queued, and drained to the
//! broker in FIFO order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;

use crate::adapter::{EventHandlers, ProxyAdapter};
use crate::broker::BrokerClient;
use crate::config::CaptureConfig;
use crate::error::{CaptureError, ConfigurationError, Result};
use crate::event::{RequestEvent, ResponseEvent, WebSocketEvent};
use crate::queue::{AttachOutcome, CaptureQueue};
use crate::record::CaptureRecord;
use crate::screenshot::{ScreenCapturer, ScreenshotManager};

/// Identifies one capture run.
///
/// The session id is immutable once set; when the caller does not
/// supply one it is derived deterministically from the names and the
/// start time.
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    casino_name: String,
    game_name: String,
    session_id: String,
    start_time: DateTime<Utc>,
}

impl SessionDescriptor {
    /// Validates the names and fixes the session id and start time.
    pub fn new(
        casino_name: impl Into<String>,
        game_name: impl Into<String>,
        session_id: Option<String>,
    ) -> std::result::Result<Self, ConfigurationError> {
        let casino_name = casino_name.into();
        let game_name = game_name.into();
        if casino_name.trim().is_empty() {
            return Err(ConfigurationError::EmptyCasinoName);
        }
        if game_name.trim().is_empty() {
            return Err(ConfigurationError::EmptyGameName);
        }

        let start_time = Utc::now();
        let session_id = match session_id {
            Some(id) if id.trim().is_empty() => return Err(ConfigurationError::EmptySessionId),
            Some(id) => id,
            None => derive_session_id(&casino_name, &game_name, start_time),
        };

        Ok(Self {
            casino_name,
            game_name,
            session_id,
            start_time,
        })
    }

    pub fn casino_name(&self) -> &str {
        &self.casino_name
    }

    pub fn game_name(&self) -> &str {
        &self.game_name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }
}

/// Derives a session id as `{casino}-{game}-{YYYYMMDD-HHMMSS}`.
/// Deterministic for a fixed start time.
pub fn derive_session_id(casino_name: &str, game_name: &str, start_time: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        casino_name,
        game_name,
        start_time.format("%Y%m%d-%H%M%S")
    )
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

/// Bounded list of records whose delivery failed after the broker's
/// own retries, kept for diagnostics and manual resubmission.
#[derive(Clone)]
struct FailedCaptures {
    records: Arc<Mutex<VecDeque<CaptureRecord>>>,
    capacity: usize,
}

impl FailedCaptures {
    fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    fn push(&self, record: CaptureRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
            tracing::warn!("failed-capture list full, dropped oldest record");
        }
        records.push_back(record);
    }

    fn snapshot(&self) -> Vec<CaptureRecord> {
        self.records.lock().iter().cloned().collect()
    }
}

/// State owned by the start/stop control path.
struct Control {
    adapter: Box<dyn ProxyAdapter>,
    drain: Option<JoinHandle<()>>,
}

/// One capture run: `Idle -> Running -> Stopping -> Idle`.
pub struct CaptureSession {
    descriptor: SessionDescriptor,
    config: CaptureConfig,
    queue: Arc<CaptureQueue>,
    screenshots: Arc<ScreenshotManager>,
    broker: Arc<dyn BrokerClient>,
    failed: FailedCaptures,
    state: Mutex<SessionState>,
    /// Fast-path flag read by the event handlers and the drain loop.
    running: Arc<AtomicBool>,
    control: tokio::sync::Mutex<Control>,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl CaptureSession {
    /// Wires the collaborators together and registers the correlation
    /// handlers with the adapter. The session starts `Idle`.
    ///
    /// The capacities in `config` must be positive; a zero depth is a
    /// [`ConfigurationError`], not a panic downstream.
    pub fn new(
        descriptor: SessionDescriptor,
        config: CaptureConfig,
        mut adapter: Box<dyn ProxyAdapter>,
        capturer: Arc<dyn ScreenCapturer>,
        broker: Arc<dyn BrokerClient>,
    ) -> Result<Self> {
        if config.max_queue_depth == 0 {
            return Err(ConfigurationError::InvalidQueueDepth.into());
        }
        if config.max_failed_captures == 0 {
            return Err(ConfigurationError::InvalidFailedCaptureLimit.into());
        }

        let queue = Arc::new(CaptureQueue::new(config.max_queue_depth));
        let screenshots = Arc::new(ScreenshotManager::new(
            &config.screenshot_root,
            descriptor.session_id(),
            config.throttle,
            capturer,
        ));
        let running = Arc::new(AtomicBool::new(false));

        adapter.register_handlers(build_handlers(
            descriptor.session_id().to_string(),
            queue.clone(),
            screenshots.clone(),
            running.clone(),
        ));

        Ok(Self {
            descriptor,
            failed: FailedCaptures::new(config.max_failed_captures),
            config,
            queue,
            screenshots,
            broker,
            state: Mutex::new(SessionState::Idle),
            running,
            control: tokio::sync::Mutex::new(Control {
                adapter,
                drain: None,
            }),
        })
    }

    pub fn descriptor(&self) -> &SessionDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Records whose delivery failed, for diagnostics and manual
    /// resubmission.
    pub fn failed_captures(&self) -> Vec<CaptureRecord> {
        self.failed.snapshot()
    }

    /// Records currently waiting to be drained.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Records evicted from the queue due to overflow.
    pub fn evictions(&self) -> u64 {
        self.queue.evictions()
    }

    /// Starts the session: screenshot manager first, then the proxy
    /// adapter (which provisions the CA before accepting traffic),
    /// then the drain loop.
    ///
    /// If any component fails, the ones already started are rolled
    /// back and the session stays `Idle`, surfacing the first failure.
    pub async fn start(&self) -> Result<()> {
        let mut ctl = self.control.lock().await;
        {
            let state = self.state.lock();
            if *state != SessionState::Idle {
                return Err(CaptureError::InvalidState {
                    expected: "idle",
                    actual: state.as_str(),
                });
            }
        }

        tracing::info!(session_id = %self.descriptor.session_id(), "starting capture session");

        self.screenshots.start()?;
        self.running.store(true, Ordering::SeqCst);

        if let Err(e) = ctl.adapter.start().await {
            // Roll back the component that did start.
            self.running.store(false, Ordering::SeqCst);
            self.screenshots.stop();
            tracing::error!(error = %e, "proxy adapter failed to start, session stays idle");
            return Err(e.into());
        }

        ctl.drain = Some(tokio::spawn(drain_loop(
            self.queue.clone(),
            self.broker.clone(),
            self.failed.clone(),
            self.config.topic.clone(),
            self.config.drain_poll,
            self.running.clone(),
        )));

        *self.state.lock() = SessionState::Running;
        tracing::info!(session_id = %self.descriptor.session_id(), "capture session running");
        Ok(())
    }

    /// Stops the session and drains the remaining queue.
    ///
    /// A no-op from `Idle`. Cleanup never raises: failures are
    /// accumulated and reported once as an aggregate, and any record
    /// whose delivery still fails lands in the failed-capture list.
    pub async fn stop(&self) {
        let mut ctl = self.control.lock().await;
        {
            let mut state = self.state.lock();
            if *state == SessionState::Idle {
                return;
            }
            *state = SessionState::Stopping;
        }

        tracing::info!(session_id = %self.descriptor.session_id(), "stopping capture session");
        self.running.store(false, Ordering::SeqCst);

        let mut failures: Vec<String> = Vec::new();

        // Reverse of start order: proxy adapter, then screenshots.
        if let Err(e) = ctl.adapter.stop().await {
            failures.push(format!("proxy adapter stop: {e}"));
        }
        self.screenshots.stop();

        if let Some(handle) = ctl.drain.take() {
            if let Err(e) = handle.await {
                failures.push(format!("drain loop: {e}"));
            }
        }

        // Stop-time drain: no further throttling concerns, deliver
        // whatever is still queued before declaring the session idle.
        while let Some(record) = self.queue.pop() {
            deliver(
                self.broker.as_ref(),
                &self.config.topic,
                record,
                &self.failed,
            )
            .await;
        }

        if let Err(e) = self.broker.close().await {
            failures.push(format!("broker close: {e}"));
        }

        *self.state.lock() = SessionState::Idle;

        if failures.is_empty() {
            tracing::info!(session_id = %self.descriptor.session_id(), "capture session stopped");
        } else {
            tracing::warn!(
                session_id = %self.descriptor.session_id(),
                count = failures.len(),
                failures = ?failures,
                "capture session stopped with cleanup failures"
            );
        }
    }
}

/// Builds the correlation handlers executed on the adapter's dispatch
/// tasks. Each path is independent: a failure affects only its own
/// event and blocks for at most one screenshot attempt.
fn build_handlers(
    session_id: String,
    queue: Arc<CaptureQueue>,
    screenshots: Arc<ScreenshotManager>,
    running: Arc<AtomicBool>,
) -> EventHandlers {
    let on_request = {
        let session_id = session_id.clone();
        let queue = queue.clone();
        let screenshots = screenshots.clone();
        let running = running.clone();
        Arc::new(move |event: RequestEvent| {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            if event.is_empty() {
                tracing::warn!("discarding request event with no data");
                return;
            }
            let screenshot = screenshots.capture();
            queue.push(CaptureRecord::from_request(&session_id, event, screenshot));
        })
    };

    let on_response = {
        let queue = queue.clone();
        let running = running.clone();
        Arc::new(move |event: ResponseEvent| {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            match queue.attach_response(event) {
                AttachOutcome::Attached => {}
                AttachOutcome::QueueEmpty => {
                    tracing::debug!("orphan response discarded, no record in flight");
                }
                AttachOutcome::AlreadyPaired => {
                    tracing::debug!("response discarded, latest record already paired");
                }
            }
        })
    };

    let on_websocket = Arc::new(move |event: WebSocketEvent| {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        let screenshot = screenshots.capture();
        queue.push(CaptureRecord::from_websocket(&session_id, event, screenshot));
    });

    EventHandlers {
        on_request,
        on_response,
        on_websocket,
    }
}

/// Single consumer of the capture queue: forwards records to the
/// broker in FIFO order while the session runs.
async fn drain_loop(
    queue: Arc<CaptureQueue>,
    broker: Arc<dyn BrokerClient>,
    failed: FailedCaptures,
    topic: String,
    poll: Duration,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match queue.pop() {
            Some(record) => deliver(broker.as_ref(), &topic, record, &failed).await,
            None => tokio::time::sleep(poll).await,
        }
    }
    tracing::debug!("drain loop exited");
}

/// Hands one record to the broker. Delivery failure (after the
/// broker's own retries) moves the record to the failed-capture list
/// rather than losing it.
async fn deliver(broker: &dyn BrokerClient, topic: &str, record: CaptureRecord, failed: &FailedCaptures) {
    tracing::debug!(
        session_id = %record.session_id,
        paired = record.is_paired(),
        "delivering capture record"
    );
    let payload = json!({
        "session_id": record.session_id,
        "timestamp": record.timestamp.to_rfc3339(),
        "data": record,
    });

    if let Err(e) = broker.publish(topic, payload).await {
        tracing::warn!(
            error = %e,
            session_id = %record.session_id,
            "capture delivery failed, keeping record for resubmission"
        );
        failed.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn descriptor_rejects_empty_names() {
        assert!(matches!(
            SessionDescriptor::new("", "Spinner", None),
            Err(ConfigurationError::EmptyCasinoName)
        ));
        assert!(matches!(
            SessionDescriptor::new("CasinoX", "  ", None),
            Err(ConfigurationError::EmptyGameName)
        ));
        assert!(matches!(
            SessionDescriptor::new("CasinoX", "Spinner", Some(String::new())),
            Err(ConfigurationError::EmptySessionId)
        ));
    }

    #[test]
    fn descriptor_keeps_supplied_session_id() {
        let descriptor =
            SessionDescriptor::new("CasinoX", "Spinner", Some("custom-id".into())).unwrap();
        assert_eq!(descriptor.session_id(), "custom-id");
    }

    #[test]
    fn derived_session_id_is_deterministic() {
        let start = Utc.with_ymd_and_hms(2026, 8, 23, 10, 30, 0).unwrap();
        let id = derive_session_id("CasinoX", "Spinner", start);
        assert_eq!(id, "CasinoX-Spinner-20260823-103000");
        assert_eq!(derive_session_id("CasinoX", "Spinner", start), id);
    }

    #[test]
    fn derived_session_id_matches_format() {
        let descriptor = SessionDescriptor::new("CasinoX", "Spinner", None).unwrap();
        let id = descriptor.session_id();
        assert!(id.starts_with("CasinoX-Spinner-"));
        // YYYYMMDD-HHMMSS suffix.
        let suffix = &id["CasinoX-Spinner-".len()..];
        assert_eq!(suffix.len(), 15);
        assert_eq!(suffix.as_bytes()[8], b'-');
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn session_state_names() {
        assert_eq!(SessionState::Idle.as_str(), "idle");
        assert_eq!(SessionState::Running.as_str(), "running");
        assert_eq!(SessionState::Stopping.as_str(), "stopping");
    }

    #[test]
    fn failed_captures_list_is_bounded() {
        let failed = FailedCaptures::new(2);
        for i in 0..4 {
            failed.push(CaptureRecord::from_request(
                "s1",
                RequestEvent {
                    method: "GET".into(),
                    url: format!("/r{i}"),
                    headers: Default::default(),
                    body: String::new(),
                    timestamp: Utc::now(),
                },
                None,
            ));
        }
        let snapshot = failed.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].request_data.as_ref().unwrap().url, "/r2");
        assert_eq!(snapshot[1].request_data.as_ref().unwrap().url, "/r3");
    }
}
