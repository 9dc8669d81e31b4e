//! Cancellation - Top-down cancellation of in-progress reconciliation
//!
//! Cancellation is observed between remote calls only: a request that is
//! already in flight is allowed to complete.

use std::future;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::ErrorKind;

/// Sender side, held by whoever owns the reconciliation call
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiver side, passed down to retry and wait loops
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
}

/// Create a connected cancel handle and cancellation token
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx: Some(rx) })
}

impl Cancellation {
    /// A token that is never cancelled
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Fail with `ErrorKind::Cancelled` if cancellation has been requested
    pub fn check(&self) -> Result<(), ErrorKind> {
        if self.is_cancelled() {
            Err(ErrorKind::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation is requested; pends forever otherwise
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling
                return future::pending().await;
            }
        }
    }

    /// Sleep for `duration` unless cancelled first
    pub async fn sleep(&self, duration: Duration) -> Result<(), ErrorKind> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancelled() => Err(ErrorKind::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_cancellation() {
        let (_handle, cancel) = cancellation();
        assert!(cancel.sleep(Duration::from_secs(30)).await.is_ok());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let (handle, cancel) = cancellation();
        let start = tokio::time::Instant::now();

        let sleeper = tokio::spawn({
            let cancel = cancel.clone();
            async move { cancel.sleep(Duration::from_secs(3600)).await }
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.cancel();

        let result = sleeper.await.unwrap();
        assert!(matches!(result, Err(ErrorKind::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(3600));
        assert!(matches!(cancel.check(), Err(ErrorKind::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_never_cancels() {
        let (handle, cancel) = cancellation();
        drop(handle);
        assert!(cancel.sleep(Duration::from_secs(1)).await.is_ok());
        assert!(cancel.check().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn never_is_never_cancelled() {
        let cancel = Cancellation::never();
        assert!(cancel.sleep(Duration::from_millis(10)).await.is_ok());
        assert!(!cancel.is_cancelled());
    }
}
