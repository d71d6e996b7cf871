//! Shutdown coordination between the binary and the accept loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Shared shutdown flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct ShutdownState {
    initiated: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once shutdown has been initiated; no new connections
    /// should be accepted after that.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.initiated.load(Ordering::Acquire)
    }

    pub fn initiate_shutdown(&self) {
        if !self.initiated.swap(true, Ordering::AcqRel) {
            info!("🛑 Shutdown initiated - no new connections will be accepted");
        }
        self.notify.notify_waiters();
    }

    /// Resolves once shutdown has been initiated.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_shutdown_initiated() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_resolves_after_initiation() {
        let state = ShutdownState::new();
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.wait().await })
        };

        tokio::task::yield_now().await;
        assert!(!state.is_shutdown_initiated());
        state.initiate_shutdown();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter finished")
            .unwrap();
        assert!(state.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_initiated() {
        let state = ShutdownState::new();
        state.initiate_shutdown();
        tokio::time::timeout(Duration::from_millis(100), state.wait())
            .await
            .expect("no wait needed");
    }
}
