use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

// ─── ScheduledTask ────────────────────────────────────────────────────────

/// A unit of work that runs on the Tokio runtime after a delay and can be
/// cancelled through its handle.
///
/// Dropping the handle cancels the task, so a poller that is torn down never
/// leaves a timer behind that later fires against discarded state. Must be
/// created from within a Tokio runtime.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Run `fut` after `delay`. A zero delay starts it on the next poll of the
    /// runtime.
    pub fn after<F>(delay: Duration, fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            fut.await;
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Cancel the task. Idempotent; a task that already finished is unaffected.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_none()
    }

    /// `true` once the task ran to completion or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the task to end. Returns `false` if it was cancelled or
    /// panicked instead of completing.
    pub async fn join(&mut self) -> bool {
        match self.handle.as_mut() {
            Some(handle) => {
                let completed = handle.await.is_ok();
                self.handle = None;
                completed
            }
            None => false,
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
