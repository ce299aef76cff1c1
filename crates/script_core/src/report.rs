//! Error reporting collaborator
//!
//! Failures raised inside plugin code, listener callbacks, or unload hooks
//! are caught at the boundary and handed to an `ErrorReporter` so they
//! reach operator-visible output without propagating further.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::error;

// A poisoned lock only means a reporter caller panicked; the captured
// reports are still valid, so recover the guard instead of propagating
// the panic.
fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Emits an in-flight failure to operator-visible output without raising
/// further.
pub trait ErrorReporter: Send + Sync {
    /// Report an error together with a short human-readable context line
    /// describing where it happened.
    fn report(&self, context: &str, error: &(dyn std::error::Error + 'static));
}

/// Default reporter backed by the `tracing` subsystem.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, context: &str, error: &(dyn std::error::Error + 'static)) {
        error!("❌ {}: {}", context, error);
    }
}

/// Reporter that captures every report for later inspection.
///
/// Intended for tests and diagnostic hosts that want to assert on the
/// exact set of isolated failures.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports captured so far, formatted as `context: error`.
    pub fn reports(&self) -> Vec<String> {
        locked(&self.reports).clone()
    }

    pub fn report_count(&self) -> usize {
        locked(&self.reports).len()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, context: &str, error: &(dyn std::error::Error + 'static)) {
        locked(&self.reports).push(format!("{}: {}", context, error));
    }
}
