//! Cooperative abort signal for long-running training
//!
//! The pipeline polls the signal between stages. Raising it never interrupts a
//! stage halfway, so outputs of completed stages stay intact.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable abort flag shared between the trigger (e.g. a Ctrl-C handler)
/// and the pipeline
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that work stops at the next checkpoint
    pub fn abort(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::warn!("Abort requested");
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_is_visible_through_clones() {
        let signal = AbortSignal::new();
        let handle = signal.clone();
        assert!(!signal.is_aborted());

        handle.abort();
        assert!(signal.is_aborted());

        // Idempotent
        handle.abort();
        assert!(signal.is_aborted());
    }
}
