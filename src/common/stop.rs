//! Cooperative stop signal for the acquisition pipeline
//!
//! # Design Principles (KISS)
//! - Settable from any thread, checked by the measurement loop exactly once
//!   per drain cycle (at the sentinel boundary, never mid-batch)
//! - A stop request therefore takes effect after the current measurement
//!   cycle fully drains, not instantaneously

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag
///
/// Clones observe the same flag. Once requested, the stop cannot be
/// withdrawn.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Create a new handle with the stop not requested
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that acquisition stop after the current cycle drains
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
