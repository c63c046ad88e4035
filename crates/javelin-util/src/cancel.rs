use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::JavelinError;

/// Cooperative cancellation flag shared between a caller and the work it
/// started.
///
/// Clones share the same flag. Long-running loops call [`check`] at their
/// head; process waits poll [`is_cancelled`] between wait attempts.
///
/// [`check`]: CancellationToken::check
/// [`is_cancelled`]: CancellationToken::is_cancelled
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones observe the flag.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` when cancellation has been requested.
    pub fn check(&self) -> Result<(), JavelinError> {
        if self.is_cancelled() {
            Err(JavelinError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_live() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_propagates_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(JavelinError::Cancelled)));
    }
}
