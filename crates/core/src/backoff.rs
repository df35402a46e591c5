//! Exponential backoff math for credential rotation.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the second credential attempt.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(4),
            max: Duration::from_secs(32),
        }
    }
}

/// Delay to sleep before attempt number `attempt` (zero-based).
///
/// Attempt 0 gets no delay; attempt `i > 0` gets `base * 2^(i-1)`
/// clamped to [`BackoffConfig::max`]. With the defaults the sequence is
/// 4s, 8s, 16s, 32s, 32s, ...
pub fn delay_for_attempt(attempt: usize, config: &BackoffConfig) -> Option<Duration> {
    if attempt == 0 {
        return None;
    }
    let shift = (attempt - 1).min(32) as u32;
    let delay = config
        .base
        .checked_mul(1u32 << shift.min(31))
        .unwrap_or(config.max);
    Some(delay.min(config.max))
}
