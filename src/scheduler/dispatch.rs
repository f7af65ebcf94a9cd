//! Root scheduling context.
//!
//! The dispatcher spawns work on the runtime the scheduler was built on and
//! keeps the handles of unfinished tasks so shutdown can wait for them. It
//! is not tied to any job's lifetime, so cleanup code of a terminated job
//! can still hand work to it.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};

use super::types::SchedulerError;

/// Spawns and tracks tasks for the scheduler.
#[derive(Clone)]
pub struct Dispatcher {
    runtime: Option<Handle>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Dispatcher {
    /// Create a dispatcher bound to the current runtime, if there is one.
    ///
    /// Without a bound runtime, spawning falls back to whatever runtime is
    /// current at spawn time.
    pub fn current() -> Self {
        Self {
            runtime: Handle::try_current().ok(),
            pending: Arc::default(),
        }
    }

    /// Create a dispatcher bound to a specific runtime.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            runtime: Some(runtime),
            pending: Arc::default(),
        }
    }

    /// Spawn `future` and track it.
    pub fn spawn<F>(&self, future: F) -> Result<AbortHandle, SchedulerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or(SchedulerError::NoRuntime)?;

        let handle = runtime.spawn(future);
        let abort = handle.abort_handle();

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
        Ok(abort)
    }

    /// Number of spawned tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|h| !h.is_finished());
        pending.len()
    }

    /// Wait for every tracked task to finish, up to `timeout`.
    ///
    /// Returns the number of tasks still running when the wait ended.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let start = tokio::time::Instant::now();
        let deadline = start + timeout;

        loop {
            let remaining = self.pending();
            if remaining == 0 {
                tracing::debug!("All dispatched tasks completed in {:?}", start.elapsed());
                return 0;
            }

            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    "Shutdown timeout ({:?}) exceeded with {} task(s) still running",
                    timeout,
                    remaining
                );
                return remaining;
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::current()
    }
}
