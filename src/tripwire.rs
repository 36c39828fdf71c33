use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// A one-shot signal that many tasks may try to fire and many tasks may wait on.
///
/// Only the first call to [`Tripwire::trip`] takes effect; later calls are
/// no-ops and report that they lost. The cause passed by the winner is what
/// every waiter observes.
///
/// Clones share the same state.
pub struct Tripwire<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    fired: AtomicBool,
    cause: watch::Sender<Option<T>>,
}

impl<T: Clone> Tripwire<T> {
    pub fn new() -> Self {
        let (cause, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                cause,
            }),
        }
    }

    /// Fire the tripwire. Returns `true` only for the call that won.
    pub fn trip(&self, cause: T) -> bool {
        if self
            .inner
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.inner.cause.send_replace(Some(cause));
        true
    }

    pub fn is_tripped(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// The winning cause, if the tripwire has fired.
    pub fn cause(&self) -> Option<T> {
        self.inner.cause.borrow().clone()
    }

    /// Wait until the tripwire fires and return the winning cause.
    ///
    /// Returns immediately if it has already fired.
    pub async fn tripped(&self) -> T {
        let mut rx = self.inner.cause.subscribe();
        loop {
            if let Some(cause) = rx.borrow_and_update().clone() {
                return cause;
            }
            // The sender lives in `inner`, which `self` keeps alive.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl<T: Clone> Default for Tripwire<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Tripwire<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Tripwire<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tripwire")
            .field("fired", &self.inner.fired.load(Ordering::Acquire))
            .finish()
    }
}
