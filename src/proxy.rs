//! Readiness of the anonymizing network layer.
//!
//! Sessions must not start while a configured SOCKS proxy is down, since
//! the engine would otherwise connect in the clear or fail midway.

use crate::config::Settings;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
pub trait ProxyGate: Send + Sync {
    /// SOCKS port handed to the engine, or None when no proxy is configured.
    fn socks_port(&self) -> Option<u16>;

    /// Whether connections can go through the proxy right now.
    async fn is_ready(&self) -> bool;
}

/// Fail with [`Error::ProxyNotReady`] unless the gate is open.
pub async fn ensure_ready(gate: &dyn ProxyGate) -> Result<Option<u16>> {
    let port = gate.socks_port();
    match port {
        None => Ok(None),
        Some(p) if gate.is_ready().await => Ok(Some(p)),
        Some(p) => {
            tracing::warn!("SOCKS proxy on port {} is not accepting connections", p);
            Err(Error::ProxyNotReady(p))
        }
    }
}

/// Considers the proxy ready once its SOCKS port accepts a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpProxyGate {
    socks_port: Option<u16>,
    timeout: Duration,
}

impl TcpProxyGate {
    pub fn new(socks_port: Option<u16>) -> Self {
        Self {
            socks_port,
            timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.proxy.socks_port)
    }
}

#[async_trait]
impl ProxyGate for TcpProxyGate {
    fn socks_port(&self) -> Option<u16> {
        self.socks_port
    }

    async fn is_ready(&self) -> bool {
        let Some(port) = self.socks_port else {
            return true;
        };
        let connect = tokio::net::TcpStream::connect(("127.0.0.1", port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!("SOCKS port {} refused connection: {}", port, e);
                false
            }
            Err(_) => false,
        }
    }
}

/// Gate whose readiness is set by hand. Used where no real proxy runs.
#[derive(Debug)]
pub struct StaticProxyGate {
    socks_port: Option<u16>,
    ready: AtomicBool,
}

impl StaticProxyGate {
    pub fn new(socks_port: Option<u16>, ready: bool) -> Self {
        Self {
            socks_port,
            ready: AtomicBool::new(ready),
        }
    }

    /// No proxy configured; always open.
    pub fn direct() -> Self {
        Self::new(None, true)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProxyGate for StaticProxyGate {
    fn socks_port(&self) -> Option<u16> {
        self.socks_port
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_proxy_is_always_ready() {
        assert_eq!(ensure_ready(&TcpProxyGate::new(None)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_listening_port_is_ready() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let gate = TcpProxyGate::new(Some(port));
        assert_eq!(ensure_ready(&gate).await.unwrap(), Some(port));
    }

    #[tokio::test]
    async fn test_closed_port_is_not_ready() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let gate = TcpProxyGate::new(Some(port));
        assert!(matches!(
            ensure_ready(&gate).await,
            Err(Error::ProxyNotReady(p)) if p == port
        ));
    }

    #[tokio::test]
    async fn test_static_gate_toggles() {
        let gate = StaticProxyGate::new(Some(9050), false);
        assert!(ensure_ready(&gate).await.is_err());
        gate.set_ready(true);
        assert_eq!(ensure_ready(&gate).await.unwrap(), Some(9050));
    }
}
