//! Slotscope proxy - MITM interception adapter for the capture
//! pipeline.
//!
//! This crate provides the transparent HTTPS proxy the capture session
//! sits behind:
//!
//! - Generates a root CA certificate on first run (RSA-2048,
//!   self-signed, ~10-year validity)
//! - Signs per-domain leaf certificates on the fly
//! - Normalizes intercepted requests, responses, and websocket frames
//!   into the core's event model and forwards the traffic unmodified
//!
//! ## Architecture
//!
//! ```text
//! Client -> hudsucker engine -> InterceptHandler -> EventHandlers
//!                 |                (normalize)       (session)
//!                 v
//!            upstream server
//! ```

mod adapter;
mod ca;
mod handler;

pub use adapter::HudsuckerAdapter;
pub use ca::CaManager;
pub use handler::InterceptHandler;

/// Default proxy listen port.
pub const DEFAULT_PROXY_PORT: u16 = 8080;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_correct() {
        assert_eq!(DEFAULT_PROXY_PORT, 8080);
    }
}
