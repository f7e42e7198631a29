//! Correlated capture records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{RequestEvent, ResponseEvent, WebSocketEvent};

/// One correlated unit of intercepted traffic plus an optional
/// screenshot, tagged with the owning session id.
///
/// A record is always seeded by a request or a websocket event; a
/// response may be attached later, at most once. The session owns the
/// record until it is enqueued; after that the drain loop owns it and
/// discards it once delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub request_data: Option<RequestEvent>,
    pub response_data: Option<ResponseEvent>,
    pub websocket_data: Option<WebSocketEvent>,
    pub screenshot_path: Option<PathBuf>,
}

impl CaptureRecord {
    /// Creates a record seeded by an intercepted request.
    pub fn from_request(
        session_id: impl Into<String>,
        request: RequestEvent,
        screenshot_path: Option<PathBuf>,
    ) -> Self {
        Self {
            timestamp: request.timestamp,
            session_id: session_id.into(),
            request_data: Some(request),
            response_data: None,
            websocket_data: None,
            screenshot_path,
        }
    }

    /// Creates a record seeded by a websocket frame. Websocket records
    /// never pair with a response.
    pub fn from_websocket(
        session_id: impl Into<String>,
        frame: WebSocketEvent,
        screenshot_path: Option<PathBuf>,
    ) -> Self {
        Self {
            timestamp: frame.timestamp,
            session_id: session_id.into(),
            request_data: None,
            response_data: None,
            websocket_data: Some(frame),
            screenshot_path,
        }
    }

    /// Attaches a response, at most once. Returns false if the record
    /// already carries one.
    pub fn attach_response(&mut self, response: ResponseEvent) -> bool {
        if self.response_data.is_some() {
            return false;
        }
        self.response_data = Some(response);
        true
    }

    /// True once both a request and its response are present.
    pub fn is_paired(&self) -> bool {
        self.request_data.is_some() && self.response_data.is_some()
    }
}
