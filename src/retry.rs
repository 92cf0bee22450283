//! Exponential backoff between retry attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::timeouts::duration_ms;

/// Delay schedule: `initial`, doubling per attempt, never above `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
    #[serde(rename = "initial_ms", with = "duration_ms")]
    pub initial: Duration,
    #[serde(rename = "max_ms", with = "duration_ms")]
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}
