//! Shutdown coordination for the proxy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};

/// Engine lifecycle, observable from outside the accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Initializing,
    Listening,
    Draining,
    Stopped,
}

/// Coordinator for shutdown.
///
/// Two triggers exist. `request_stop` (the in-band control verb) only sets a
/// flag the accept loop reads at the top of its next iteration. `interrupt`
/// (OS signals) also wakes the loop at once through a broadcast channel so
/// the listening socket is closed without waiting for the idle tick.
/// Both are idempotent.
#[derive(Debug, Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    stop_requested: AtomicBool,
    interrupted: AtomicBool,
    tx: broadcast::Sender<()>,
    state: watch::Sender<LifecycleState>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        let (state, _) = watch::channel(LifecycleState::Initializing);
        Self {
            inner: Arc::new(Inner {
                stop_requested: AtomicBool::new(false),
                interrupted: AtomicBool::new(false),
                tx,
                state,
            }),
        }
    }

    /// Stop after the current connection; consumed at the next loop iteration.
    pub fn request_stop(&self) {
        if !self.inner.stop_requested.swap(true, Ordering::SeqCst) {
            tracing::info!("Shutdown requested");
        }
    }

    /// Stop now: flag and wake every subscriber.
    pub fn interrupt(&self) {
        if !self.inner.interrupted.swap(true, Ordering::SeqCst) {
            tracing::info!("Interrupt received, closing listener");
            let _ = self.inner.tx.send(());
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stop_requested.load(Ordering::SeqCst) || self.is_interrupted()
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Subscribe to interrupts. Check `is_interrupted` after subscribing:
    /// an interrupt sent earlier is not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.inner.tx.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state.borrow()
    }

    pub(crate) fn set_state(&self, state: LifecycleState) {
        self.inner.state.send_replace(state);
        tracing::debug!(state = ?state, "Lifecycle transition");
    }

    /// Resolve once the engine has fully stopped.
    pub async fn stopped(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|s| *s == LifecycleState::Stopped).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stop_request_sets_flag_only() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        shutdown.request_stop();
        shutdown.request_stop();
        assert!(shutdown.is_stopping());
        assert!(!shutdown.is_interrupted());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn interrupt_wakes_subscribers_once() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        shutdown.interrupt();
        shutdown.interrupt();
        assert!(shutdown.is_stopping());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stopped_resolves_on_state_change() {
        let shutdown = Shutdown::new();
        assert_eq!(shutdown.state(), LifecycleState::Initializing);

        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.stopped().await })
        };
        shutdown.set_state(LifecycleState::Listening);
        shutdown.set_state(LifecycleState::Stopped);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("stopped() should resolve")
            .unwrap();
    }
}
