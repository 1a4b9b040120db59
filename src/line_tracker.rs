use std::sync::atomic::{AtomicU64, Ordering};

/// Counts lines written to the machine-readable log file so console hints
/// can point at them.
pub trait LineTracker: Send + Sync {
    /// Last known line count. No side effects.
    fn current(&self) -> u64;

    /// Increment and return the new count.
    fn advance(&self) -> u64;

    fn reset(&self);
}

/// Lock-free [`LineTracker`] backed by an atomic counter.
#[derive(Debug, Default)]
pub struct AtomicLineTracker {
    line: AtomicU64,
}

impl AtomicLineTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LineTracker for AtomicLineTracker {
    fn current(&self) -> u64 {
        self.line.load(Ordering::SeqCst)
    }

    fn advance(&self) -> u64 {
        self.line.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn reset(&self) {
        self.line.store(0, Ordering::SeqCst);
    }
}
