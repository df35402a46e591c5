//! Engine tuning knobs with production defaults.

use std::time::Duration;

pub use reelforge_core::backoff::BackoffConfig;

/// Hard ceiling on poll rounds per run to prevent runaway loops.
pub const MAX_POLL_ROUNDS: u32 = 120;

/// Tunable parameters for the whole orchestration run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of poll rounds before the run gives up.
    pub max_poll_rounds: u32,
    /// Sleep between poll rounds.
    pub poll_interval: Duration,
    /// Sleep after a transport-level batch-check failure before the
    /// round is retried.
    pub poll_error_cooldown: Duration,
    /// Download attempts per copy before it is marked failed.
    pub max_download_retries: u32,
    /// Pause after a reference-image upload so the provider can index
    /// it; submitting immediately tends to draw a 400.
    pub upload_settle_delay: Duration,
    /// Cooldown stamped on a credential that just got throttled.
    pub credential_cooldown: Duration,
    /// Inter-attempt backoff for credential rotation.
    pub backoff: BackoffConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_poll_rounds: MAX_POLL_ROUNDS,
            poll_interval: Duration::from_secs(5),
            poll_error_cooldown: Duration::from_secs(10),
            max_download_retries: 5,
            upload_settle_delay: Duration::from_secs(1),
            credential_cooldown: Duration::from_secs(60),
            backoff: BackoffConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Parameters for the global outbound-call gate.
///
/// The provider throttles by account/IP tier, not per credential, so the
/// gate applies across all credentials.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Minimum delay between any two outbound calls.
    pub min_interval: Duration,
    /// Calls allowed inside one rolling window before the hard cooldown
    /// kicks in.
    pub max_calls_per_window: u32,
    /// Length of the rolling window.
    pub window: Duration,
    /// Sleep imposed once the window budget is exhausted; the window
    /// resets afterwards.
    pub hard_cooldown: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(10),
            max_calls_per_window: 6,
            window: Duration::from_secs(60),
            hard_cooldown: Duration::from_secs(60),
        }
    }
}
