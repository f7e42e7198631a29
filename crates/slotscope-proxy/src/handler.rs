//! Flow normalization for the hudsucker engine.
//!
//! Converts engine-native requests, responses, and websocket frames
//! into the core's plain event model and forwards them to the
//! session's registered handlers. Traffic itself passes through
//! unmodified; this is an observe-only intercept.

use std::collections::HashMap;

use chrono::Utc;
use http_body_util::{BodyExt, Full};
use hudsucker::{
    hyper::{Request, Response},
    tokio_tungstenite::tungstenite::Message,
    Body, HttpContext, HttpHandler, RequestOrResponse, WebSocketContext, WebSocketHandler,
};
use hyper::body::Bytes;

use slotscope_core::{
    CaptureEvent, EventHandlers, RequestEvent, ResponseEvent, WebSocketEvent, WsDirection,
};

/// Helper to convert bytes back into a Body after collecting.
fn bytes_to_body(bytes: Bytes) -> Body {
    Body::from(Full::new(bytes))
}

/// Flattens a header map into owned strings, lossy on non-UTF-8
/// values.
fn header_map(headers: &hyper::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Extracts a textual payload from a websocket frame. Control frames
/// (ping/pong/close) yield nothing and pass through untouched.
fn ws_payload(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(data) => Some(String::from_utf8_lossy(data).into_owned()),
        _ => None,
    }
}

/// Hudsucker handler dispatching normalized events to the session.
#[derive(Clone)]
pub struct InterceptHandler {
    handlers: EventHandlers,
}

impl InterceptHandler {
    /// Creates a handler forwarding to the given session handlers.
    pub fn new(handlers: EventHandlers) -> Self {
        Self { handlers }
    }

    /// Hands the event to the session off the engine's I/O loop; the
    /// session's handlers may block for one screenshot attempt.
    fn dispatch(&self, event: CaptureEvent) {
        let handlers = self.handlers.clone();
        tokio::task::spawn_blocking(move || handlers.dispatch(event));
    }
}

impl HttpHandler for InterceptHandler {
    async fn handle_request(
        &mut self,
        _ctx: &HttpContext,
        req: Request<Body>,
    ) -> RequestOrResponse {
        let (parts, body) = req.into_parts();
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read request body");
                Bytes::new()
            }
        };

        self.dispatch(CaptureEvent::Request(RequestEvent {
            method: parts.method.to_string(),
            url: parts.uri.to_string(),
            headers: header_map(&parts.headers),
            body: String::from_utf8_lossy(&bytes).into_owned(),
            timestamp: Utc::now(),
        }));

        RequestOrResponse::Request(Request::from_parts(parts, bytes_to_body(bytes)))
    }

    async fn handle_response(&mut self, _ctx: &HttpContext, res: Response<Body>) -> Response<Body> {
        let (parts, body) = res.into_parts();
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read response body");
                Bytes::new()
            }
        };

        self.dispatch(CaptureEvent::Response(ResponseEvent {
            status_code: parts.status.as_u16(),
            headers: header_map(&parts.headers),
            body: String::from_utf8_lossy(&bytes).into_owned(),
            timestamp: Utc::now(),
        }));

        Response::from_parts(parts, bytes_to_body(bytes))
    }
}

impl WebSocketHandler for InterceptHandler {
    async fn handle_message(&mut self, ctx: &WebSocketContext, msg: Message) -> Option<Message> {
        if let Some(payload) = ws_payload(&msg) {
            let direction = match ctx {
                WebSocketContext::ClientToServer { .. } => WsDirection::Send,
                WebSocketContext::ServerToClient { .. } => WsDirection::Receive,
            };
            self.dispatch(CaptureEvent::WebSocket(WebSocketEvent {
                direction,
                payload,
                timestamp: Utc::now(),
            }));
        }
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_map_flattens_values() {
        let mut headers = hyper::header::HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("x-game", "spinner".parse().unwrap());

        let map = header_map(&headers);
        assert_eq!(map.get("content-type").unwrap(), "application/json");
        assert_eq!(map.get("x-game").unwrap(), "spinner");
    }

    #[test]
    fn ws_payload_reads_text_and_binary_frames() {
        assert_eq!(
            ws_payload(&Message::text("{\"spin\":1}")).unwrap(),
            "{\"spin\":1}"
        );
        let binary = Message::binary(vec![b'o', b'k']);
        assert_eq!(ws_payload(&binary).unwrap(), "ok");
    }

    #[test]
    fn ws_payload_skips_control_frames() {
        assert!(ws_payload(&Message::Ping(Default::default())).is_none());
    }
}
