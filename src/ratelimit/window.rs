//! Per-limiter window configuration.

use std::time::Duration;

use crate::error::{AdmissionError, Result};

/// Immutable admission limits shared by every key of one limiter.
///
/// A key may be admitted at most `max_admits` times inside a window of
/// length `window`. The window opens at the first admit after the previous
/// one has fully elapsed, so windows are key-local and not aligned to any
/// wall-clock grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSpec {
    max_admits: u64,
    window: Duration,
}

impl RateLimitSpec {
    /// Create a new spec, rejecting a zero capacity or an empty window.
    pub fn new(max_admits: u64, window: Duration) -> Result<Self> {
        if max_admits == 0 {
            return Err(AdmissionError::Config(
                "max_admits must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(AdmissionError::Config(
                "window must be greater than zero".to_string(),
            ));
        }
        Ok(Self { max_admits, window })
    }

    /// Maximum admits per key per window.
    pub fn max_admits(&self) -> u64 {
        self.max_admits
    }

    /// Length of a window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a window opened at `elapsed` ago has fully run out.
    pub(crate) fn has_elapsed(&self, elapsed: Duration) -> bool {
        elapsed >= self.window
    }
}
