// A cooperative cancellation flag shared between a caller and a long-running operation
// (spec.md §5). Checked between stripes and between chunks within a stripe; an
// operation that observes cancellation returns `ErrorKind::Cancelled` without
// committing any partial result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{err_kind, ErrorKind, Result};

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `Err(ErrorKind::Cancelled)` if cancellation has been requested.
    /// Call sites check this between stripes and between per-column chunk reads.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(err_kind(ErrorKind::Cancelled, "operation cancelled"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn test_fresh_token_not_cancelled() {
        let t = CancelToken::new();
        assert!(!t.is_cancelled());
        assert!(t.check().is_ok());
    }

    #[test]
    fn test_cancel_is_observed_through_clones() {
        let t = CancelToken::new();
        let clone = t.clone();
        clone.cancel();
        assert!(t.is_cancelled());
        assert_eq!(t.check().unwrap_err().kind(), ErrorKind::Cancelled);
    }
}
