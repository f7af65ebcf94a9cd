//! Scoped, hierarchical lifetimes.
//!
//! A [`Lifetime`] owns an ordered list of cleanup actions. Terminating it
//! runs every action exactly once, newest first. Nested lifetimes are torn
//! down with their parent but can also be terminated on their own, which
//! detaches them from the parent.
//!
//! ```
//! use jobexec::Lifetime;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! let root = Lifetime::root("app");
//! let job = root.nested("job-1");
//!
//! let runs = Arc::new(AtomicU32::new(0));
//! let counter = Arc::clone(&runs);
//! job.on_termination(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//!     Ok(())
//! })
//! .unwrap();
//!
//! assert!(job.terminate().unwrap());
//! assert!(!job.terminate().unwrap());
//! assert_eq!(runs.load(Ordering::SeqCst), 1);
//! assert!(!root.is_terminated());
//! ```

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;
use tokio::sync::watch;

/// Error type returned by a cleanup action.
pub type CleanupError = Box<dyn std::error::Error + Send + Sync>;

type Cleanup = Box<dyn FnOnce() -> Result<(), CleanupError> + Send>;

static NEXT_LIFETIME_ID: AtomicU64 = AtomicU64::new(1);

/// Errors that can occur while terminating a lifetime.
#[derive(Debug, Error)]
pub enum LifetimeError {
    /// One or more cleanup actions failed. All other actions still ran.
    #[error("cleanup failed in lifetime '{name}' ({lifetime}): {}", .failures.join("; "))]
    CleanupFailed {
        lifetime: LifetimeId,
        name: String,
        failures: Vec<String>,
    },
}

/// Process-unique identifier of a lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LifetimeId(u64);

impl LifetimeId {
    fn next() -> Self {
        Self(NEXT_LIFETIME_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LifetimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lt-{}", self.0)
    }
}

struct State {
    terminated: bool,
    next_key: u64,
    cleanups: Vec<(u64, Cleanup)>,
    /// Key of the cascade action registered on the parent.
    parent_key: Option<u64>,
}

struct Inner {
    id: LifetimeId,
    name: String,
    parent: Option<Weak<Inner>>,
    state: Mutex<State>,
    done_tx: watch::Sender<bool>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A cancellation scope with ordered, run-once cleanup.
///
/// Cloning a `Lifetime` yields another handle to the same scope.
#[derive(Clone)]
pub struct Lifetime {
    inner: Arc<Inner>,
}

impl Lifetime {
    /// Create a root lifetime with no parent.
    pub fn root(name: impl Into<String>) -> Self {
        Self::create(name.into(), None)
    }

    fn create(name: String, parent: Option<Weak<Inner>>) -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                id: LifetimeId::next(),
                name,
                parent,
                state: Mutex::new(State {
                    terminated: false,
                    next_key: 0,
                    cleanups: Vec::new(),
                    parent_key: None,
                }),
                done_tx,
            }),
        }
    }

    /// Create a child lifetime.
    ///
    /// The child is terminated when this lifetime terminates. If this
    /// lifetime is already terminated the child is returned terminated.
    pub fn nested(&self, name: impl Into<String>) -> Lifetime {
        let child = Self::create(name.into(), Some(Arc::downgrade(&self.inner)));
        let weak_child = Arc::downgrade(&child.inner);

        let key = self.register(Box::new(move || {
            if let Some(inner) = weak_child.upgrade() {
                Lifetime { inner }
                    .terminate()
                    .map(|_| ())
                    .map_err(|e| Box::new(e) as CleanupError)
            } else {
                Ok(())
            }
        }));

        match key {
            Ok(key) => child.inner.state().parent_key = Some(key),
            Err(result) => {
                if let Err(e) = result {
                    tracing::warn!(
                        lifetime = %child.id(),
                        error = %e,
                        "Nested lifetime cleanup failed"
                    );
                }
            }
        }

        child
    }

    /// Identifier of this lifetime.
    pub fn id(&self) -> LifetimeId {
        self.inner.id
    }

    /// Name given at creation.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether termination has started.
    pub fn is_terminated(&self) -> bool {
        self.inner.state().terminated
    }

    /// Register a cleanup action.
    ///
    /// If the lifetime is already terminated the action runs immediately on
    /// the calling thread and its error, if any, is returned.
    pub fn on_termination<F>(&self, cleanup: F) -> Result<(), LifetimeError>
    where
        F: FnOnce() -> Result<(), CleanupError> + Send + 'static,
    {
        match self.register(Box::new(cleanup)) {
            Ok(_) => Ok(()),
            Err(Ok(())) => Ok(()),
            Err(Err(failure)) => Err(LifetimeError::CleanupFailed {
                lifetime: self.id(),
                name: self.inner.name.clone(),
                failures: vec![failure],
            }),
        }
    }

    /// Add `cleanup` to the list, or run it now if already terminated.
    ///
    /// Returns the registration key, or the outcome of the immediate run.
    fn register(&self, cleanup: Cleanup) -> Result<u64, Result<(), String>> {
        {
            let mut state = self.inner.state();
            if !state.terminated {
                let key = state.next_key;
                state.next_key += 1;
                state.cleanups.push((key, cleanup));
                return Ok(key);
            }
        }
        Err(run_cleanup(cleanup))
    }

    fn unregister(&self, key: u64) {
        let mut state = self.inner.state();
        state.cleanups.retain(|(k, _)| *k != key);
    }

    /// Terminate the lifetime, running every cleanup action exactly once.
    ///
    /// Returns `Ok(true)` when this call performed the termination and
    /// `Ok(false)` when the lifetime was already terminated. Failed actions
    /// do not stop the remaining ones; they are reported together.
    pub fn terminate(&self) -> Result<bool, LifetimeError> {
        let (cleanups, parent_key) = {
            let mut state = self.inner.state();
            if state.terminated {
                return Ok(false);
            }
            state.terminated = true;
            (std::mem::take(&mut state.cleanups), state.parent_key.take())
        };

        if let (Some(key), Some(parent)) = (
            parent_key,
            self.inner.parent.as_ref().and_then(Weak::upgrade),
        ) {
            Lifetime { inner: parent }.unregister(key);
        }

        let failures: Vec<String> = cleanups
            .into_iter()
            .rev()
            .filter_map(|(_, cleanup)| run_cleanup(cleanup).err())
            .collect();

        self.inner.done_tx.send_replace(true);

        if failures.is_empty() {
            Ok(true)
        } else {
            Err(LifetimeError::CleanupFailed {
                lifetime: self.id(),
                name: self.inner.name.clone(),
                failures,
            })
        }
    }

    /// Wait until termination has finished running its cleanup actions.
    pub async fn terminated(&self) {
        let mut rx = self.inner.done_tx.subscribe();
        // The sender lives as long as `self`, so this only fails if dropped.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Number of pending cleanup actions, including nested lifetimes.
    pub fn pending_cleanups(&self) -> usize {
        self.inner.state().cleanups.len()
    }
}

impl fmt::Debug for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifetime")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

fn run_cleanup(cleanup: Cleanup) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(cleanup)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("cleanup panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("cleanup panicked: {}", s)
    } else {
        "cleanup panicked".to_string()
    }
}
