//! One-shot completion signal.
//!
//! Once completed a [`Completion`] stays done, releasing every current and
//! future waiter, until it is explicitly re-armed with [`Completion::reinit`].

use fpsense_core::{Error, Result};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct Completion {
    done: watch::Sender<bool>,
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl Completion {
    pub fn new() -> Self {
        Self {
            done: watch::Sender::new(false),
        }
    }

    /// Release all waiters.
    pub fn complete_all(&self) {
        self.done.send_replace(true);
    }

    /// Re-arm for the next wait.
    pub fn reinit(&self) {
        self.done.send_replace(false);
    }

    #[cfg(test)]
    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait without a deadline.
    ///
    /// # Errors
    ///
    /// Returns `Error::Interrupted` if `cancel` fires first.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        let mut rx = self.done.subscribe();
        let done = async move { rx.wait_for(|done| *done).await.map(|_| ()) };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Interrupted),
            result = done => result.map_err(|_| Error::Interrupted),
        }
    }

    /// Wait at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if the completion is not signalled in time.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.done.subscribe();
        let done = async move { rx.wait_for(|done| *done).await.map(|_| ()) };

        match tokio::time::timeout(timeout, done).await {
            Ok(result) => result.map_err(|_| Error::Interrupted),
            Err(_) => Err(Error::timeout(timeout.as_millis() as u64)),
        }
    }
}
