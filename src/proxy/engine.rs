//! The accept loop.
//!
//! # Responsibilities
//! - Own the listening socket and the request handler
//! - Serve connections one at a time (default) or one task each
//! - Observe the stop flag between connections and interrupts immediately
//! - Drive the lifecycle state machine

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::Instrument;

use crate::cache::{open_store, CacheError, CacheStore};
use crate::config::{EngineMode, ProxyConfig};
use crate::lifecycle::{spawn_signal_listener, LifecycleState, Shutdown};
use crate::net::{read_request, ConnectionGuard, ConnectionTracker, Listener, ListenerError};
use crate::proxy::RequestHandler;
use crate::upstream::{FetchError, Fetcher, HttpFetcher};

/// Error type for engine startup.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("cache unavailable: {0}")]
    Cache(#[from] CacheError),

    #[error("upstream client unavailable: {0}")]
    Fetcher(#[from] FetchError),
}

#[derive(Debug, Clone, Copy)]
struct ReadLimits {
    max_bytes: usize,
    timeout: Duration,
}

/// A bound, ready-to-run recording proxy.
pub struct ProxyEngine {
    listener: Listener,
    handler: Arc<RequestHandler>,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    mode: EngineMode,
    handle_signals: bool,
    limits: ReadLimits,
}

impl ProxyEngine {
    /// Bind the listener with explicit collaborators.
    pub async fn bind(
        config: &ProxyConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, EngineError> {
        let shutdown = Shutdown::new();
        let listener = Listener::bind(&config.listener).await?;
        let handler = Arc::new(RequestHandler::new(config, store, fetcher, shutdown.clone()));

        Ok(Self {
            listener,
            handler,
            shutdown,
            tracker: ConnectionTracker::new(),
            mode: config.engine.mode,
            handle_signals: config.engine.handle_signals,
            limits: ReadLimits {
                max_bytes: config.listener.read_buffer_size,
                timeout: Duration::from_millis(config.listener.read_timeout_ms),
            },
        })
    }

    /// Open the configured store, build the HTTP fetcher, then bind.
    pub async fn from_config(config: &ProxyConfig) -> Result<Self, EngineError> {
        let store = open_store(&config.cache)?;
        let fetcher = Arc::new(HttpFetcher::new(&config.upstream)?);
        Self::bind(config, store, fetcher).await
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for stopping the engine or waiting on its state from outside.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn store(&self) -> Arc<dyn CacheStore> {
        Arc::clone(self.handler.store())
    }

    /// Accept and serve until stopped. The socket is closed on return.
    pub async fn run(self) -> Result<(), EngineError> {
        let ProxyEngine { listener, handler, shutdown, tracker, mode, handle_signals, limits } = self;

        let signals = handle_signals.then(|| spawn_signal_listener(shutdown.clone()));
        let mut interrupts = shutdown.subscribe();

        shutdown.set_state(LifecycleState::Listening);
        tracing::info!(
            address = ?listener.local_addr().ok(),
            mode = ?mode,
            "Proxy accepting connections"
        );

        loop {
            if shutdown.is_stopping() {
                break;
            }

            let accepted = tokio::select! {
                _ = interrupts.recv() => break,
                accepted = listener.poll_accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(Some(conn)) => conn,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Accept failed");
                    tokio::time::sleep(listener.poll_interval()).await;
                    continue;
                }
            };

            let guard = tracker.track();
            match mode {
                EngineMode::Sequential => {
                    serve_connection(&handler, stream, peer, guard, limits).await;
                }
                EngineMode::Concurrent => {
                    let Some(permit) = listener.acquire_slot().await else {
                        break;
                    };
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        serve_connection(&handler, stream, peer, guard, limits).await;
                        drop(permit);
                    });
                }
            }
        }

        shutdown.set_state(LifecycleState::Draining);
        drop(listener);
        tracing::info!(in_flight = tracker.active_count(), "Listener closed, draining");
        tracker.wait_idle().await;

        if let Some(signals) = signals {
            signals.abort();
        }
        shutdown.set_state(LifecycleState::Stopped);
        tracing::info!("Proxy stopped");
        Ok(())
    }
}

async fn serve_connection(
    handler: &RequestHandler,
    mut stream: TcpStream,
    peer: SocketAddr,
    guard: ConnectionGuard,
    limits: ReadLimits,
) {
    let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
    async move {
        let raw = match read_request(&mut stream, limits.max_bytes, limits.timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(error = %e, "Client read failed");
                return;
            }
        };

        let response = handler.handle(&raw).await;
        if let Err(e) = stream.write_all(&response).await {
            tracing::debug!(error = %e, "Client went away before the response was written");
        }
        let _ = stream.shutdown().await;
        drop(guard);
    }
    .instrument(span)
    .await
}
