//! Silence-triggered auto-stop timer.
//!
//! Holds at most one pending timeout. Arming an already-armed timer keeps
//! the original deadline, so repeated silence edges don't push the stop
//! further out. Disarm cancels the pending timeout if it hasn't fired.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// One-slot timer that fires a callback after a quiet period.
pub struct AutoStopTimer {
    slot: Option<JoinHandle<()>>,
}

impl AutoStopTimer {
    /// Creates a disarmed timer.
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// Arms the timer. If a timeout is already pending, the call is ignored
    /// and the earlier deadline stands.
    pub fn arm<F, Fut>(&mut self, timeout: Duration, fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        if let Some(slot) = &self.slot {
            if !slot.is_finished() {
                debug!("auto-stop timer already armed, keeping earlier deadline");
                return;
            }
        }
        self.slot = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            fire().await;
        }));
    }

    /// Cancels the pending timeout, if any. Safe to call when disarmed.
    pub fn disarm(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.abort();
        }
    }

    /// Returns true while a timeout is pending.
    pub fn is_armed(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| !slot.is_finished())
    }
}

impl Default for AutoStopTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AutoStopTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}
