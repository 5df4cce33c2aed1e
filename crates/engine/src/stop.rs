//! Cooperative stop tokens for running filter jobs
//!
//! A stop request is only a signal: the engine decides when (and whether)
//! to honor it, and a stopped execution still reports a completion. Callers
//! must therefore never assume a job is gone just because it was signalled.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cooperative stop flag shared between a job handle and its worker.
///
/// The engine is expected to check `is_stop_requested()` periodically
/// during execution and bail out early when it is set. All clones observe
/// the same underlying flag.
///
/// # Example
///
/// ```
/// use filter_runner_engine::StopToken;
///
/// let token = StopToken::new();
/// let worker_token = token.clone();
///
/// token.request_stop();
/// assert!(worker_token.is_stop_requested());
/// ```
#[derive(Clone, Debug, Default)]
pub struct StopToken {
    stop_requested: Arc<AtomicBool>,
}

impl StopToken {
    /// Create a new token with no stop requested
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the execution stop as soon as convenient
    ///
    /// Idempotent: repeated requests are harmless.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested on this token or any clone
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}
