//! Slotscope core - capture pipeline for intercepted slot-game traffic.
//!
//! The pipeline correlates each intercepted HTTP(S)/websocket exchange
//! with a throttled screen capture taken at the moment of interception
//! and streams the correlated records to a downstream broker.
//!
//! ## Architecture
//!
//! ```text
//! Proxy engine -> ProxyAdapter -> session handlers -> CaptureQueue
//!                 (normalize)     (correlate + tag      |
//!                                  screenshot)          v
//!                                                  drain loop -> BrokerClient
//! ```
//!
//! The proxy engine, the screen-pixel-capture primitive, and the
//! broker are external collaborators behind the [`ProxyAdapter`],
//! [`ScreenCapturer`], and [`BrokerClient`] traits so a harness can
//! inject no-op implementations.

mod adapter;
mod broker;
mod config;
mod error;
mod event;
mod queue;
mod record;
mod screenshot;
mod session;

pub use adapter::{EventHandlers, ProxyAdapter, RequestHandler, ResponseHandler, WebSocketHandler};
pub use broker::BrokerClient;
pub use config::CaptureConfig;
pub use error::{
    BrokerError, CaptureError, CertificateError, ConfigurationError, ProxyError, Result,
    ScreenshotError,
};
pub use event::{CaptureEvent, RequestEvent, ResponseEvent, WebSocketEvent, WsDirection};
pub use queue::{AttachOutcome, CaptureQueue};
pub use record::CaptureRecord;
pub use screenshot::{ScreenCapturer, ScreenshotManager};
pub use session::{derive_session_id, CaptureSession, SessionDescriptor, SessionState};
