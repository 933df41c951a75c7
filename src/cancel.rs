//! Cancellation context for external tool invocations

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

/// Caller-supplied cancellation/deadline context.
///
/// Clones share the same cancellation flag, so one clone can be handed to a
/// long-running [`patch`](crate::GlibcPatcher::patch) call while another is
/// used to cancel it from a different thread. A deadline, if set, is fixed
/// at construction time and checked alongside the flag.
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// Create a context that never expires and is only cancelled explicitly
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that expires after the given duration
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Request cancellation; all clones observe it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested or the deadline has passed
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}
