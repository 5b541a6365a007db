//! Cooperative cancellation for render tasks

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation token shared between the scheduler and the render worker.
///
/// Engines that can stop mid-rasterization poll `is_cancelled()`. Engines that
/// cannot simply finish; the worker checks the token again afterwards and the
/// scheduler drops the late result.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; all clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
