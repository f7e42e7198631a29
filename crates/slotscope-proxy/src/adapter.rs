//! Hudsucker-backed proxy adapter.
//!
//! Implements the core's [`ProxyAdapter`] seam on top of the hudsucker
//! MITM engine: `start()` provisions the CA before the engine accepts
//! connections, `stop()` requests a graceful shutdown bounded by the
//! grace period.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use hudsucker::rustls::crypto::aws_lc_rs::default_provider;
use hudsucker::Proxy;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use slotscope_core::{EventHandlers, ProxyAdapter, ProxyError};

use crate::ca::CaManager;
use crate::handler::InterceptHandler;

/// A running engine task and its shutdown signal.
struct EngineTask {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// MITM proxy adapter over the hudsucker engine.
pub struct HudsuckerAdapter {
    addr: SocketAddr,
    ca: CaManager,
    shutdown_grace: Duration,
    handlers: Option<EventHandlers>,
    engine: Option<EngineTask>,
}

impl HudsuckerAdapter {
    /// Creates an adapter listening on `addr`, provisioning CA
    /// material through `ca`.
    pub fn new(addr: SocketAddr, ca: CaManager, shutdown_grace: Duration) -> Self {
        Self {
            addr,
            ca,
            shutdown_grace,
            handlers: None,
            engine: None,
        }
    }

    /// Address the engine listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Path of the CA certificate for trust-store installation.
    pub fn ca_cert_path(&self) -> PathBuf {
        self.ca.cert_path()
    }
}

#[async_trait]
impl ProxyAdapter for HudsuckerAdapter {
    fn register_handlers(&mut self, handlers: EventHandlers) {
        self.handlers = Some(handlers);
    }

    async fn start(&mut self) -> Result<(), ProxyError> {
        if self.engine.is_some() {
            return Err(ProxyError::InvalidState("already started"));
        }
        let handlers = self
            .handlers
            .clone()
            .ok_or(ProxyError::InvalidState("missing event handlers"))?;

        // Certificate provisioning must complete before the engine
        // accepts its first connection.
        self.ca.ensure_certificate()?;
        let authority = self.ca.load_authority()?;

        let handler = InterceptHandler::new(handlers);
        let proxy = Proxy::builder()
            .with_addr(self.addr)
            .with_ca(authority)
            .with_rustls_connector(default_provider())
            .with_http_handler(handler.clone())
            .with_websocket_handler(handler)
            .build()
            .map_err(|e| ProxyError::Engine(e.to_string()))?;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let handle = tokio::spawn(async move {
            tokio::select! {
                result = proxy.start() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "proxy engine error");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("proxy shutdown signal received");
                }
            }
        });

        tracing::info!(addr = %self.addr, ca_cert = %self.ca.cert_path().display(), "MITM proxy started");
        self.engine = Some(EngineTask {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ProxyError> {
        let Some(task) = self.engine.take() else {
            return Ok(());
        };

        let _ = task.shutdown_tx.send(());
        let abort = task.handle.abort_handle();

        match tokio::time::timeout(self.shutdown_grace, task.handle).await {
            Ok(Ok(())) => {
                tracing::info!("proxy engine stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ProxyError::Engine(format!("engine task failed: {e}"))),
            Err(_) => {
                // Best-effort past the budget: tear the task down and
                // surface the timeout.
                abort.abort();
                Err(ProxyError::ShutdownTimeout(self.shutdown_grace))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn noop_handlers() -> EventHandlers {
        EventHandlers {
            on_request: Arc::new(|_| {}),
            on_response: Arc::new(|_| {}),
            on_websocket: Arc::new(|_| {}),
        }
    }

    fn adapter(dir: &TempDir) -> HudsuckerAdapter {
        HudsuckerAdapter::new(
            SocketAddr::from(([127, 0, 0, 1], 0)),
            CaManager::new(dir.path().join("ca")),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn start_without_handlers_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut adapter = adapter(&dir);
        assert!(matches!(
            adapter.start().await,
            Err(ProxyError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let mut adapter = adapter(&dir);
        assert!(adapter.stop().await.is_ok());
    }

    #[tokio::test]
    async fn start_provisions_ca_and_stop_shuts_down() {
        let dir = TempDir::new().unwrap();
        let mut adapter = adapter(&dir);
        adapter.register_handlers(noop_handlers());

        adapter.start().await.unwrap();
        assert!(adapter.ca_cert_path().exists());

        // Double start is a state error.
        assert!(matches!(
            adapter.start().await,
            Err(ProxyError::InvalidState(_))
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        adapter.stop().await.unwrap();
    }
}
