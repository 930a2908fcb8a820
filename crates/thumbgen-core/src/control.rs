//! Cooperative shutdown: a shared token checked at phase boundaries.
//!
//! The CLI installs a signal listener that cancels the token; the scheduler
//! checks it at run start, after enumeration, before dispatching each file,
//! and before each conversion unit. Work already in flight always finishes,
//! so destination artifacts are never truncated mid-write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error returned when a run is stopped by the shutdown token.
#[derive(Debug)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run cancelled by shutdown signal")
    }
}

impl std::error::Error for Cancelled {}

/// Cloneable stop signal shared by the scheduler and its workers.
/// Cancellation is one-way and sticky.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Safe to call from any thread, any number of times.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Suspension-point check: `Err(Cancelled)` once shutdown was requested.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_clear_and_sticks_once_cancelled() {
        let token = ShutdownToken::new();
        assert!(!token.is_cancelled());
        assert!(token.checkpoint().is_ok());

        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(token.checkpoint().is_err());

        // Cancelling again is a no-op.
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
