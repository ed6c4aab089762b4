//! Progress reporting for pipeline stages.
//!
//! Wraps the caller-supplied [`ProgressFn`] and enforces the reporting
//! contract: percentages never decrease within one job, and −1 is emitted
//! only through [`Reporter::fail`].

use std::sync::Arc;
use std::sync::atomic::{AtomicI16, Ordering};

use drydock_core::{ProgressFn, StatusUpdate};

/// Per-job progress reporter handed down to every stage.
pub struct Reporter {
    send: ProgressFn,
    /// Highest percentage reported so far; later reports are clamped up
    /// to this floor so progress is monotonically non-decreasing.
    floor: AtomicI16,
}

impl Reporter {
    pub fn new(send: ProgressFn) -> Self {
        Self {
            send,
            floor: AtomicI16::new(0),
        }
    }

    /// A reporter that discards everything (tests, fire-and-forget paths).
    pub fn sink() -> Self {
        Self::new(Arc::new(|_| {}))
    }

    /// Informational message without a progress figure.
    pub fn info(&self, message: impl Into<String>) {
        (self.send)(StatusUpdate::info(message));
    }

    /// Progress at `percent`, clamped so it never moves backwards.
    pub fn progress(&self, message: impl Into<String>, percent: i16) {
        let prev = self.floor.fetch_max(percent, Ordering::SeqCst);
        (self.send)(StatusUpdate::progress(message, percent.max(prev)));
    }

    /// A best-effort sub-step failed; the job carries on.
    pub fn warn(&self, message: impl Into<String>, cause: impl Into<String>) {
        (self.send)(StatusUpdate::warning(message, cause));
    }

    /// Terminal failure for the whole job.
    pub fn fail(&self, message: impl Into<String>, cause: impl Into<String>) {
        (self.send)(StatusUpdate::failure(message, cause));
    }
}
