//! TCP listener with an idle-tick accept.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept a ready connection, or return after one idle tick so the caller
//!   can observe shutdown between connections
//! - Bound in-flight connections via semaphore (concurrent mode)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// The proxy's listening socket.
pub struct Listener {
    inner: TcpListener,
    /// Idle sleep between readiness checks.
    poll_interval: Duration,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            poll_interval_ms = config.poll_interval_ms,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Accept a ready connection, or `None` after one idle tick.
    pub async fn poll_accept(&self) -> Result<Option<(TcpStream, SocketAddr)>, ListenerError> {
        match tokio::time::timeout(self.poll_interval, self.inner.accept()).await {
            Err(_idle) => Ok(None),
            Ok(Ok((stream, addr))) => {
                tracing::debug!(peer_addr = %addr, "Connection accepted");
                Ok(Some((stream, addr)))
            }
            Ok(Err(e)) => Err(ListenerError::Accept(e)),
        }
    }

    /// Wait for a connection slot. Hold the permit for the connection's lifetime.
    pub async fn acquire_slot(&self) -> Option<ConnectionPermit> {
        let permit = self.connection_limit.clone().acquire_owned().await.ok()?;
        Some(ConnectionPermit { _permit: permit })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the slot is released back to the pool, even if the
/// connection task panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            max_connections: 2,
            ..ListenerConfig::default()
        }
    }

    #[tokio::test]
    async fn idle_tick_returns_none() {
        let listener = Listener::bind(&config()).await.unwrap();
        assert!(listener.poll_accept().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn accepts_ready_connection() {
        let listener = Listener::bind(&config()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();

        let mut accepted = None;
        for _ in 0..100 {
            if let Some(conn) = listener.poll_accept().await.unwrap() {
                accepted = Some(conn);
                break;
            }
        }
        assert!(accepted.is_some());
    }

    #[tokio::test]
    async fn slots_are_bounded() {
        let listener = Listener::bind(&config()).await.unwrap();
        let a = listener.acquire_slot().await.unwrap();
        let _b = listener.acquire_slot().await.unwrap();
        assert_eq!(listener.available_permits(), 0);
        drop(a);
        assert_eq!(listener.available_permits(), 1);
    }

    #[tokio::test]
    async fn bad_address_fails_to_bind() {
        let config = ListenerConfig { bind_address: "nowhere".into(), ..ListenerConfig::default() };
        assert!(matches!(Listener::bind(&config).await, Err(ListenerError::Bind(_))));
    }
}
