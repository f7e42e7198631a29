//! Proxy adapter seam.
//!
//! The capture session registers one handler per event kind; the
//! adapter normalizes engine-native flow objects into [`CaptureEvent`]s
//! and dispatches them here. Handlers may block for up to one
//! screenshot attempt, so adapters must run them off the engine's I/O
//! loop.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProxyError;
use crate::event::{CaptureEvent, RequestEvent, ResponseEvent, WebSocketEvent};

pub type RequestHandler = Arc<dyn Fn(RequestEvent) + Send + Sync>;
pub type ResponseHandler = Arc<dyn Fn(ResponseEvent) + Send + Sync>;
pub type WebSocketHandler = Arc<dyn Fn(WebSocketEvent) + Send + Sync>;

/// The set of handlers a session registers with its adapter.
#[derive(Clone)]
pub struct EventHandlers {
    pub on_request: RequestHandler,
    pub on_response: ResponseHandler,
    pub on_websocket: WebSocketHandler,
}

impl EventHandlers {
    /// Routes a normalized event to the handler for its kind.
    pub fn dispatch(&self, event: CaptureEvent) {
        match event {
            CaptureEvent::Request(e) => (self.on_request)(e),
            CaptureEvent::Response(e) => (self.on_response)(e),
            CaptureEvent::WebSocket(e) => (self.on_websocket)(e),
        }
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers").finish_non_exhaustive()
    }
}

/// Façade over the external proxy engine's hook interface.
///
/// `start()` must complete certificate provisioning before the engine
/// begins accepting connections. `stop()` requests a graceful engine
/// shutdown; exceeding the shutdown budget is a
/// [`ProxyError::ShutdownTimeout`], not a crash.
#[async_trait]
pub trait ProxyAdapter: Send + Sync {
    /// Registers the session's event handlers. Must be called before
    /// `start()`.
    fn register_handlers(&mut self, handlers: EventHandlers);

    /// Provisions the engine (CA material, listen address) and begins
    /// intercepting.
    async fn start(&mut self) -> Result<(), ProxyError>;

    /// Gracefully shuts the engine down.
    async fn stop(&mut self) -> Result<(), ProxyError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatch_routes_by_event_kind() {
        let requests = Arc::new(AtomicUsize::new(0));
        let responses = Arc::new(AtomicUsize::new(0));
        let frames = Arc::new(AtomicUsize::new(0));

        let (r, s, w) = (requests.clone(), responses.clone(), frames.clone());
        let handlers = EventHandlers {
            on_request: Arc::new(move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            }),
            on_response: Arc::new(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            }),
            on_websocket: Arc::new(move |_| {
                w.fetch_add(1, Ordering::SeqCst);
            }),
        };

        handlers.dispatch(CaptureEvent::Request(RequestEvent {
            method: "GET".into(),
            url: "/spin".into(),
            headers: HashMap::new(),
            body: String::new(),
            timestamp: Utc::now(),
        }));
        handlers.dispatch(CaptureEvent::Response(ResponseEvent {
            status_code: 200,
            headers: HashMap::new(),
            body: String::new(),
            timestamp: Utc::now(),
        }));

        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert_eq!(responses.load(Ordering::SeqCst), 1);
        assert_eq!(frames.load(Ordering::SeqCst), 0);
    }
}
