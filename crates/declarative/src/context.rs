//! Execution callbacks and cancellation
//!
//! These traits allow the declarative crate to be used without
//! depending on specific progress bars, prompts, or signal handling.

use crate::planner::PlanStep;
use crate::types::ApplyResult;
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Progress callback for execution operations
///
/// All methods are called from the thread that invoked the executor.
pub trait ProgressCallback {
    /// Called once before any step runs
    fn on_start(&mut self, total_steps: usize);

    /// Called when a step is dispatched to the worker pool
    fn on_step_start(&mut self, step: &PlanStep);

    /// Called when a step finishes, fails, or is skipped
    fn on_step_complete(&mut self, step: &PlanStep, result: &ApplyResult);

    /// Called after the last step
    fn on_finish(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_start(&mut self, _total_steps: usize) {}
    fn on_step_start(&mut self, _step: &PlanStep) {}
    fn on_step_complete(&mut self, _step: &PlanStep, _result: &ApplyResult) {}
    fn on_finish(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Cooperative cancellation signal shared between the caller and the executor
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on cancellation
    ///
    /// Returns `false` if the token was cancelled before the time elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(50);

        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_sleep_returns_early_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_completes() {
        let token = CancellationToken::new();
        assert!(token.sleep(Duration::from_millis(1)));
    }
}
