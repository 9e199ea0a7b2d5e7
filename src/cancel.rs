//! Cooperative cancellation for long-running verification walks.

use crate::error::GitTufError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation token passed through verification and traversal calls.
///
/// Cancellation is cooperative: RSL walks and range verifications check the
/// token between entries and abort with [`GitTufError::Cancelled`]. An aborted
/// operation leaves no persistent state behind.
///
/// Tokens are cheaply cloneable; clones observe the same cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones of this token observe the request.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Return true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fail with [`GitTufError::Cancelled`] if cancellation has been requested.
    pub fn check(&self) -> Result<(), GitTufError> {
        if self.is_cancelled() {
            return Err(GitTufError::Cancelled);
        }
        Ok(())
    }
}
