//! Capture session configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Tunables for one capture session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Root directory screenshots are written under (one subdirectory
    /// per session id).
    pub screenshot_root: PathBuf,
    /// Minimum wall-clock gap between two captured screenshots.
    pub throttle: Duration,
    /// Capacity of the capture queue; the oldest record is evicted on
    /// overflow.
    pub max_queue_depth: usize,
    /// Capacity of the failed-capture list kept for manual
    /// resubmission.
    pub max_failed_captures: usize,
    /// Drain loop poll interval while the queue is empty.
    pub drain_poll: Duration,
    /// Budget for graceful proxy shutdown before forceful teardown.
    pub shutdown_grace: Duration,
    /// Broker topic capture records are published to.
    pub topic: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            screenshot_root: PathBuf::from("screenshots"),
            throttle: Duration::from_millis(500),
            max_queue_depth: 1000,
            max_failed_captures: 100,
            drain_poll: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(5),
            topic: "captures".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CaptureConfig::default();
        assert_eq!(config.throttle, Duration::from_millis(500));
        assert!(config.max_queue_depth > 0);
        assert!(config.max_failed_captures > 0);
        assert_eq!(config.topic, "captures");
    }
}
