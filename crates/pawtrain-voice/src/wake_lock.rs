//! Keep-awake hook held while a session is running.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Platform screen/system keep-awake. Both calls must be idempotent.
pub trait WakeLock: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

/// Tracks the held state without touching the platform. Used by the terminal shell.
#[derive(Debug, Default)]
pub struct NoopWakeLock {
    held: AtomicBool,
}

impl NoopWakeLock {
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl WakeLock for NoopWakeLock {
    fn acquire(&self) {
        if !self.held.swap(true, Ordering::SeqCst) {
            debug!("Wake lock acquired");
        }
    }

    fn release(&self) {
        if self.held.swap(false, Ordering::SeqCst) {
            debug!("Wake lock released");
        }
    }
}
