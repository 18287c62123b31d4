//! Cooperative cancellation shared by every network call and backoff sleep.
//!
//! A [`CancelSource`] owns the sending half of a `watch` channel; every
//! [`CancelToken`] cloned from it observes the same flag. Work is raced
//! against the token with [`CancelToken::run`], so dropping the losing future
//! aborts in-flight HTTP requests.

use std::future::Future;
use thiserror::Error;
use tokio::sync::watch;

/// Returned when the run was cancelled before an operation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Fires cancellation for all tokens handed out by this source.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap, clonable view of a [`CancelSource`].
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that can never fire.
    #[cfg(test)]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the source fires. Pends forever if the source is gone
    /// without having fired.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Drive `work` to completion unless the token fires first.
    pub async fn run<F>(&self, work: F) -> Result<F::Output, Cancelled>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled),
            out = work => Ok(out),
        }
    }

    /// Sleep for `delay`, returning early with [`Cancelled`] if the token fires.
    pub async fn sleep(&self, delay: std::time::Duration) -> Result<(), Cancelled> {
        self.run(tokio::time::sleep(delay)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_completes_when_not_cancelled() {
        let source = CancelSource::new();
        let token = source.token();
        let out = token.run(async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn test_run_returns_cancelled_when_already_fired() {
        let source = CancelSource::new();
        let token = source.token();
        source.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.run(async { 1 }).await, Err(Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_work() {
        let source = CancelSource::new();
        let token = source.token();

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            source.cancel();
        };
        let (out, _) = tokio::join!(token.run(std::future::pending::<()>()), canceller);
        assert_eq!(out, Err(Cancelled));
    }

    #[tokio::test]
    async fn test_never_token_does_not_fire() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        let out = token.sleep(Duration::from_millis(5)).await;
        assert_eq!(out, Ok(()));
    }
}
