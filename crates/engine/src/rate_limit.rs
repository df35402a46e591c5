//! Global outbound-call gate.
//!
//! One [`RateLimiter`] instance is constructed per engine and shared by
//! reference; there is no process-wide state. The gate is deliberately
//! global across credentials because the provider throttles by
//! account/IP tier regardless of which credential signs the call.

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Blocks callers until the next outbound call is permitted.
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<GateState>,
}

#[derive(Debug, Default)]
struct GateState {
    last_call: Option<Instant>,
    window_start: Option<Instant>,
    calls_in_window: u32,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Wait until the next outbound call is allowed, then record it.
    ///
    /// Enforces the fixed minimum inter-call delay, and once the rolling
    /// window's call budget is exhausted imposes the hard cooldown and
    /// resets the window. The internal lock is held across the sleeps:
    /// the delay is global, so concurrent callers queue behind it.
    pub async fn gate(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        // Roll the window forward if it has aged out.
        if let Some(start) = state.window_start {
            if now.duration_since(start) >= self.config.window {
                state.window_start = Some(now);
                state.calls_in_window = 0;
            }
        }

        if state.calls_in_window >= self.config.max_calls_per_window {
            tracing::info!(
                cooldown_ms = self.config.hard_cooldown.as_millis() as u64,
                "call budget for this window exhausted, entering hard cooldown",
            );
            tokio::time::sleep(self.config.hard_cooldown).await;
            state.window_start = Some(Instant::now());
            state.calls_in_window = 0;
        }

        if let Some(last) = state.last_call {
            let since = Instant::now().duration_since(last);
            if since < self.config.min_interval {
                tokio::time::sleep(self.config.min_interval - since).await;
            }
        }

        let now = Instant::now();
        state.last_call = Some(now);
        if state.window_start.is_none() {
            state.window_start = Some(now);
        }
        state.calls_in_window += 1;
    }
}
