//! HTTP broker client.
//!
//! POSTs capture records as JSON to `<base>/<topic>`. Retries with a
//! stepped backoff before reporting failure; the session moves records
//! that still fail into its failed-capture list.

use std::time::Duration;

use async_trait::async_trait;

use slotscope_core::{BrokerClient, BrokerError};

/// Waits between delivery attempts after the first failure.
const DEFAULT_BACKOFF: [Duration; 2] = [Duration::from_secs(2), Duration::from_secs(4)];

/// Broker client delivering records over HTTP.
pub struct HttpBroker {
    base_url: String,
    client: reqwest::Client,
    backoff: Vec<Duration>,
}

impl HttpBroker {
    /// Creates a client posting to endpoints under `base_url`. The
    /// underlying connection is acquired lazily on first publish.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            backoff: DEFAULT_BACKOFF.to_vec(),
        }
    }

    #[cfg(test)]
    fn without_backoff(base_url: impl Into<String>) -> Self {
        Self {
            backoff: Vec::new(),
            ..Self::new(base_url)
        }
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/{}", self.base_url, topic)
    }

    async fn post(&self, topic: &str, payload: &serde_json::Value) -> Result<(), BrokerError> {
        let url = self.topic_url(topic);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BrokerError::Publish(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for HttpBroker {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), BrokerError> {
        let mut last = match self.post(topic, &payload).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        for (attempt, delay) in self.backoff.iter().enumerate() {
            tracing::warn!(
                attempt = attempt + 1,
                error = %last,
                "broker publish failed, retrying"
            );
            tokio::time::sleep(*delay).await;
            match self.post(topic, &payload).await {
                Ok(()) => return Ok(()),
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized() {
        let broker = HttpBroker::new("http://localhost:9000/");
        assert_eq!(broker.topic_url("captures"), "http://localhost:9000/captures");
    }

    #[tokio::test]
    async fn unreachable_broker_reports_connection_error() {
        // Reserved port, nothing listens there.
        let broker = HttpBroker::without_backoff("http://127.0.0.1:1");
        let result = broker
            .publish("captures", serde_json::json!({"session_id": "s1"}))
            .await;
        assert!(matches!(result, Err(BrokerError::Connection(_))));
    }
}
