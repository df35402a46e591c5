//! Credential pool with smart rotation and exponential backoff.
//!
//! [`CredentialPool::execute`] runs one operation against the provider,
//! rotating round-robin through interchangeable secrets. Failures are
//! classified structurally (never by re-parsing message text): invalid
//! or forbidden credentials are skipped, throttled credentials are
//! stamped with a cooldown and rotation continues, and a malformed
//! request aborts rotation outright since no credential can fix it.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use reelforge_client::ApiError;
use reelforge_core::backoff::{delay_for_attempt, BackoffConfig};
use reelforge_core::error::FailureKind;
use reelforge_core::naming::credential_hint;
use reelforge_events::{EngineEvent, EventBus};

/// Failure of one full rotation pass.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    /// The failure is not credential-related (a malformed request);
    /// rotation stopped after the first attempt that produced it.
    #[error("request failed, rotation aborted: {0}")]
    Aborted(#[source] ApiError),

    /// Every usable credential was tried without success.
    #[error("all credentials exhausted after {attempts} attempts")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Option<ApiError>,
    },
}

impl RotationError {
    /// Whether the underlying failure classifies as a malformed request.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, RotationError::Aborted(e) if e.kind() == FailureKind::InvalidArgument)
    }
}

/// Ordered pool of interchangeable provider credentials.
///
/// Designed for a single active orchestration run; concurrent runs must
/// serialize access externally.
pub struct CredentialPool {
    secrets: Vec<String>,
    /// Cooldown-until stamp per credential, set on throttling.
    cooldowns: Mutex<Vec<Option<Instant>>>,
    backoff: BackoffConfig,
    cooldown: Duration,
    events: EventBus,
}

impl CredentialPool {
    pub fn new(
        secrets: Vec<String>,
        backoff: BackoffConfig,
        cooldown: Duration,
        events: EventBus,
    ) -> Self {
        let secrets: Vec<String> = secrets
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let cooldowns = Mutex::new(vec![None; secrets.len()]);
        Self {
            secrets,
            cooldowns,
            backoff,
            cooldown,
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Execute `op` with credential rotation.
    ///
    /// Each credential is tried at most once per call; attempt `i > 0`
    /// is preceded by an exponential backoff sleep. Credentials inside
    /// their cooldown window are skipped without an attempt or a sleep.
    /// Retrying the whole pool is the caller's decision.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, RotationError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let total = self.secrets.len();
        let mut attempts = 0usize;
        let mut last_error: Option<ApiError> = None;

        for (index, secret) in self.secrets.iter().enumerate() {
            let hint = credential_hint(secret);

            if self.in_cooldown(index) {
                tracing::debug!(index, hint = %hint, "credential cooling down, skipped");
                self.events
                    .publish(EngineEvent::CredentialSkipped { hint });
                continue;
            }

            if let Some(delay) = delay_for_attempt(attempts, &self.backoff) {
                tracing::info!(
                    delay_ms = delay.as_millis() as u64,
                    "backing off before next credential",
                );
                self.events.publish(EngineEvent::CredentialBackoff {
                    delay_ms: delay.as_millis() as u64,
                });
                tokio::time::sleep(delay).await;
            }

            attempts += 1;
            tracing::info!(index, total, hint = %hint, "trying credential");
            self.events.publish(EngineEvent::CredentialAttempt {
                index,
                total,
                hint: hint.clone(),
            });

            match op(secret.clone()).await {
                Ok(result) => {
                    tracing::info!(hint = %hint, "credential succeeded");
                    return Ok(result);
                }
                Err(error) => {
                    let kind = error.kind();
                    tracing::warn!(hint = %hint, ?kind, error = %error, "credential attempt failed");
                    self.events.publish(EngineEvent::CredentialFailed {
                        hint,
                        kind,
                    });

                    if !kind.is_credential_related() {
                        return Err(RotationError::Aborted(error));
                    }
                    if kind == FailureKind::RateLimited {
                        self.start_cooldown(index);
                    }
                    last_error = Some(error);
                }
            }
        }

        tracing::error!(attempts, total, "all credentials exhausted");
        self.events
            .publish(EngineEvent::CredentialsExhausted { attempts });
        Err(RotationError::Exhausted {
            attempts,
            last: last_error,
        })
    }

    fn in_cooldown(&self, index: usize) -> bool {
        let cooldowns = self.cooldowns.lock().unwrap_or_else(|e| e.into_inner());
        match cooldowns[index] {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    fn start_cooldown(&self, index: usize) {
        let mut cooldowns = self.cooldowns.lock().unwrap_or_else(|e| e.into_inner());
        cooldowns[index] = Some(Instant::now() + self.cooldown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(secrets: &[&str]) -> CredentialPool {
        CredentialPool::new(
            secrets.iter().map(|s| s.to_string()).collect(),
            BackoffConfig::default(),
            Duration::from_secs(60),
            EventBus::default(),
        )
    }

    fn provider_err(status: u16) -> ApiError {
        ApiError::Provider {
            status,
            message: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_first_credential_without_sleeping() {
        let pool = pool(&["secret-aaaaaa"]);
        let start = Instant::now();
        let result = pool.execute(|_| async { Ok::<_, ApiError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn rotates_past_throttled_credentials_with_backoff() {
        // Scenario: first two credentials return 429, third succeeds
        // after backoff sleeps of 4s then 8s.
        let pool = pool(&["key-one-111111", "key-two-222222", "key-three-333333"]);
        let calls = AtomicUsize::new(0);
        let start = Instant::now();

        let result = pool
            .execute(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(provider_err(429))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_tries_each_credential_once() {
        let pool = pool(&["k1-aaaaaa", "k2-bbbbbb", "k3-cccccc", "k4-dddddd"]);
        let calls = AtomicUsize::new(0);
        let start = Instant::now();

        let result: Result<(), _> = pool
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(provider_err(500)) }
            })
            .await;

        assert_matches!(result, Err(RotationError::Exhausted { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // N-1 backoff sleeps: 4 + 8 + 16 seconds.
        assert_eq!(start.elapsed(), Duration::from_secs(28));
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_credentials_are_skipped_not_fatal() {
        let pool = pool(&["bad-key-111111", "good-key-222222"]);
        let calls = AtomicUsize::new(0);

        let result = pool
            .execute(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(provider_err(401))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_argument_aborts_rotation() {
        let pool = pool(&["k1-aaaaaa", "k2-bbbbbb", "k3-cccccc"]);
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = pool
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(provider_err(400)) }
            })
            .await;

        // A malformed request fails on every credential; only one try.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let error = result.unwrap_err();
        assert!(error.is_invalid_argument());
        assert_matches!(error, RotationError::Aborted(_));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_credential_skipped_on_next_pass() {
        let pool = pool(&["k1-aaaaaa", "k2-bbbbbb"]);
        let calls = AtomicUsize::new(0);

        // First pass: k1 throttles, k2 succeeds.
        let _ = pool
            .execute(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(provider_err(429))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Second pass inside the cooldown window: k1 must be skipped,
        // so the single successful call goes straight to k2.
        let seen = Mutex::new(Vec::new());
        let result = pool
            .execute(|secret| {
                seen.lock().unwrap().push(secret);
                async { Ok::<_, ApiError>(()) }
            })
            .await;
        assert!(result.is_ok());
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec!["k2-bbbbbb".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pool_is_exhausted_immediately() {
        let pool = pool(&["", "   "]);
        assert!(pool.is_empty());
        let result: Result<(), _> = pool.execute(|_| async { Ok(()) }).await;
        assert_matches!(result, Err(RotationError::Exhausted { attempts: 0, .. }));
    }
}
