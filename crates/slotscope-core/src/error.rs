//! Error types for the capture pipeline.

use thiserror::Error;

/// Session descriptor validation error. Fatal: the session never starts.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Casino name must be non-empty.
    #[error("casino name must not be empty")]
    EmptyCasinoName,

    /// Game name must be non-empty.
    #[error("game name must not be empty")]
    EmptyGameName,

    /// A caller-supplied session id must be non-empty.
    #[error("session id must not be empty")]
    EmptySessionId,

    /// The capture queue must hold at least one record.
    #[error("max queue depth must be at least 1")]
    InvalidQueueDepth,

    /// The failed-capture list must hold at least one record.
    #[error("max failed captures must be at least 1")]
    InvalidFailedCaptureLimit,
}

/// CA provisioning error. Fatal to session start; never retried.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// Failed to generate the CA key or certificate.
    #[error("failed to generate CA: {0}")]
    Generation(String),

    /// Failed to read or write CA material.
    #[error("CA IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse existing CA material.
    #[error("failed to parse CA: {0}")]
    Parse(String),
}

/// Proxy adapter error. Fatal to the start/stop operation it occurred in.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// CA certificate error during provisioning.
    #[error("CA error: {0}")]
    Certificate(#[from] CertificateError),

    /// Engine failed to build or run.
    #[error("proxy engine error: {0}")]
    Engine(String),

    /// The engine did not shut down within the grace period and was torn down.
    #[error("proxy engine shutdown timed out after {0:?}")]
    ShutdownTimeout(std::time::Duration),

    /// The adapter was asked to start or stop in the wrong state.
    #[error("proxy adapter is {0}")]
    InvalidState(&'static str),
}

/// Screenshot manager start/stop error. Individual `capture()` calls
/// never raise; they return `None`.
#[derive(Debug, Error)]
pub enum ScreenshotError {
    /// `start()` called while already active.
    #[error("screenshot manager already active")]
    AlreadyActive,

    /// Session directory could not be created.
    #[error("screenshot IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The capture primitive failed (permissions, no display).
    #[error("screen capture failed: {0}")]
    Capture(String),
}

/// Broker delivery error surfaced by the collaborator. Captured into
/// the failed-capture list, not propagated to the caller.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Could not reach the broker.
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// Publish was rejected after the broker's own retries.
    #[error("broker publish failed: {0}")]
    Publish(String),
}

/// Session-processing error.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Session descriptor was invalid.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Proxy adapter failed in the start/stop critical path.
    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// Screenshot manager failed to start or stop.
    #[error("screenshot error: {0}")]
    Screenshot(#[from] ScreenshotError),

    /// Session method called in the wrong state.
    #[error("invalid session state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
