use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::GenAiError;

/// Shared flag telling an in-flight request that its result is no longer wanted.
///
/// Blocking HTTP calls cannot be interrupted mid-flight, so the flag is checked before a
/// request is dispatched and again once its reply arrives; a reply that lands after
/// `cancel` is dropped. Cancelling twice is a no-op.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), GenAiError> {
        if self.is_cancelled() {
            return Err(GenAiError::Cancelled);
        }
        Ok(())
    }
}
