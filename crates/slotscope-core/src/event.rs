//! Normalized proxy events.
//!
//! The proxy adapter converts engine-native flow objects into these
//! plain values before handing them to the capture session. They are
//! consumed by the session's handlers and never persisted directly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An intercepted HTTP(S) request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl RequestEvent {
    /// True when the event carries no usable data. Such events are
    /// logged and discarded by the session.
    pub fn is_empty(&self) -> bool {
        self.url.is_empty()
    }
}

/// An intercepted HTTP(S) response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Direction of a websocket frame relative to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsDirection {
    /// Client to server.
    Send,
    /// Server to client.
    Receive,
}

/// An intercepted websocket frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSocketEvent {
    pub direction: WsDirection,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

/// Normalized form of a proxy engine callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Request(RequestEvent),
    Response(ResponseEvent),
    WebSocket(WebSocketEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> RequestEvent {
        RequestEvent {
            method: "GET".into(),
            url: url.into(),
            headers: HashMap::new(),
            body: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn request_with_url_is_not_empty() {
        assert!(!request("/spin").is_empty());
    }

    #[test]
    fn request_without_url_is_empty() {
        assert!(request("").is_empty());
    }

    #[test]
    fn ws_direction_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&WsDirection::Send).unwrap(),
            "\"send\""
        );
        assert_eq!(
            serde_json::to_string(&WsDirection::Receive).unwrap(),
            "\"receive\""
        );
    }
}
