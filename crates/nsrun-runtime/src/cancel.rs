//! Cross-thread cancellation of a launch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Cloneable handle that cancels the launch it was taken from.
///
/// Before the container process exists, cancelling makes the launch
/// abort at its next checkpoint. Once the process exists, cancelling
/// kills it so the wait returns and cleanup runs.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    cancelled: AtomicBool,
    // 0 while no container process is tracked
    pid: AtomicU32,
}

impl CancelHandle {
    /// Creates a handle in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation and kills the tracked process, if any.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let pid = self.inner.pid.load(Ordering::SeqCst);
        if pid != 0 {
            tracing::info!(pid, "cancelling running container");
            if let Err(e) = crate::process::kill(pid) {
                tracing::warn!(pid, error = %e, "failed to kill container on cancel");
            }
        }
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Starts tracking `pid`. A cancellation requested before this call is
    /// applied to the process immediately.
    pub(crate) fn track(&self, pid: u32) {
        self.inner.pid.store(pid, Ordering::SeqCst);
        if self.is_cancelled() {
            self.cancel();
        }
    }

    /// Stops tracking the process once it has been reaped.
    pub(crate) fn untrack(&self) {
        self.inner.pid.store(0, Ordering::SeqCst);
    }

    /// Clears a previous cancellation so the handle can serve a new launch.
    pub(crate) fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
        self.inner.pid.store(0, Ordering::SeqCst);
    }
}
