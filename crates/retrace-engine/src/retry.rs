//! Per-step retry policy.
//!
//! A step gets one initial attempt plus `max_retries` retries. The delay is only
//! slept before a retry, never after the final failure.

use crate::config::RetryDefaults;
use retrace_common::trace::TraceStep;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Step metadata wins field by field; `defaults` fills whatever it leaves out.
    pub fn for_step(step: &TraceStep, defaults: &RetryDefaults) -> Self {
        let config = step.retry_config();
        Self {
            max_retries: config
                .and_then(|c| c.max_attempts)
                .unwrap_or(defaults.max_attempts),
            delay: Duration::from_millis(
                config.and_then(|c| c.delay).unwrap_or(defaults.delay_ms),
            ),
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt may follow the attempt numbered `retry_count` (0-based).
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}
