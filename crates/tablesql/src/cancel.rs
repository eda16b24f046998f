//! Cooperative cancellation for long-running load and export operations.
//!
//! A [`CancellationToken`] is cheap to clone and share; the loader checks it
//! at chunk boundaries, between files, and between sheets. A fired token
//! rolls back the in-flight chunk transaction and surfaces
//! [`TableSqlError::Cancelled`] while leaving the database handle usable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::err::TableSqlError;

/// A cloneable cancellation token with an optional deadline.
///
/// All clones share the same cancellation flag; the deadline is fixed at
/// construction. The default token never fires.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Creates a token that only fires when [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that additionally fires once `timeout` has elapsed.
    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Fires the token. All clones observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the token has fired or the deadline has elapsed.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Returns [`TableSqlError::Cancelled`] if the token has fired.
    pub fn check(&self) -> Result<(), TableSqlError> {
        if self.is_cancelled() {
            Err(TableSqlError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(TableSqlError::Cancelled)));
    }

    #[test]
    fn elapsed_deadline_fires() {
        let token = CancellationToken::with_deadline(Duration::from_secs(0));
        assert!(token.is_cancelled());
    }
}
