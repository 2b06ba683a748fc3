//! Shutdown signal shared by the driver task and every live-reload stream.

use tokio::sync::watch;

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    /// Shutdown requested; loops should wind down
    Closing,
    /// Teardown finished
    Closed,
}

/// Cloneable handle to the engine's shutdown state.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<ShutdownState>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ShutdownState::Running);
        Self { tx }
    }

    pub fn state(&self) -> ShutdownState {
        *self.tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Request shutdown. Returns `true` only for the call that moved the
    /// state out of `Running`.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::Closing;
                true
            } else {
                false
            }
        })
    }

    /// Record that teardown has finished.
    pub fn mark_closed(&self) {
        self.tx.send_if_modified(|state| {
            if *state == ShutdownState::Closed {
                false
            } else {
                *state = ShutdownState::Closed;
                true
            }
        });
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|state| *state != ShutdownState::Running).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_is_idempotent() {
        let shutdown = Shutdown::new();
        assert!(shutdown.is_running());

        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert_eq!(shutdown.state(), ShutdownState::Closing);

        shutdown.mark_closed();
        assert!(!shutdown.trigger());
        assert_eq!(shutdown.state(), ShutdownState::Closed);
    }

    #[tokio::test]
    async fn test_wait_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_closing() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_millis(100), shutdown.wait())
            .await
            .unwrap();
    }
}
