//! Call context threaded through manager and instance operations
//!
//! The graph bookkeeping never blocks, so the context exists for the work a
//! concrete resource type does during `apply` and `destroy` (binding a
//! socket, stopping a process). The manager checks it on entry to every
//! operation; resource types check it wherever they could wait.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cancellation handle with an optional deadline.
///
/// Clones share the cancellation flag: cancelling any clone cancels all of
/// them. A child created with [`Context::with_timeout`] shares the parent's
/// flag and adds (or tightens) a deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless [`cancel`](Self::cancel) is called.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context that also expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return the cancellation error, if any
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled("context cancelled"));
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(Error::Cancelled("deadline exceeded"));
        }
        Ok(())
    }
}
