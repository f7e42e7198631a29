//! Message broker seam.

use async_trait::async_trait;

use crate::error::BrokerError;

/// Downstream message-broker collaborator.
///
/// The client owns its own retry/backoff policy: a returned error
/// means delivery failed after all of the broker's retries. The
/// session treats publishes as at-least-once-or-explicit-failure.
///
/// Handles are owned, passed to the session at construction. The
/// expected discipline is connection acquisition on first publish and
/// release in [`BrokerClient::close`], which the session calls once on
/// stop.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Publishes a structured record to `topic`.
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), BrokerError>;

    /// Releases the underlying connection. Called on session stop.
    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}
