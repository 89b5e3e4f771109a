//! Named retry policies and the backoff loop shared by every remote call.
//!
//! Delays are computed as `min(initial * multiplier^(n-1), max)` after the
//! `n`th failure. Sleeping goes through [`SettingsSleeper`] so callers can
//! substitute a recording or immediate sleeper in tests.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Backoff parameters for one class of operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Factor applied to the delay after each further failure.
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy for loads: fail over to local tiers quickly.
    pub const LOAD: Self = Self {
        max_attempts: 2,
        initial_delay: Duration::from_millis(500),
        backoff_multiplier: 1.5,
        max_delay: Duration::from_millis(2_000),
    };

    /// Policy for saves: favour durability over latency.
    pub const SAVE: Self = Self {
        max_attempts: 4,
        initial_delay: Duration::from_millis(1_000),
        backoff_multiplier: 2.0,
        max_delay: Duration::from_millis(8_000),
    };

    /// Policy for health probes: a single quick attempt.
    pub const HEALTH: Self = Self {
        max_attempts: 1,
        initial_delay: Duration::from_millis(250),
        backoff_multiplier: 1.0,
        max_delay: Duration::from_millis(250),
    };

    /// Delay to wait after `failures` consecutive failed attempts.
    ///
    /// # Examples
    ///
    /// ```
    /// # use column_settings::domain::RetryPolicy;
    /// # use std::time::Duration;
    /// let policy = RetryPolicy::SAVE;
    /// assert_eq!(policy.delay_after(1), Duration::from_millis(1_000));
    /// assert_eq!(policy.delay_after(3), Duration::from_millis(4_000));
    /// assert_eq!(policy.delay_after(9), Duration::from_millis(8_000));
    /// ```
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(0.0).powi(exponent);
        let secs = self.initial_delay.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// The named policy table used by the orchestrator and health monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicies {
    /// Applied to remote loads.
    pub load: RetryPolicy,
    /// Applied to remote saves.
    pub save: RetryPolicy,
    /// Applied to health probes.
    pub health: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            load: RetryPolicy::LOAD,
            save: RetryPolicy::SAVE,
            health: RetryPolicy::HEALTH,
        }
    }
}

/// Async sleeping abstraction used for backoff, debounce and scheduling.
#[async_trait]
pub trait SettingsSleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Tokio-based sleeper implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl SettingsSleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `operation` under `policy`, sleeping between retryable failures.
///
/// `operation` receives the 1-based attempt number. The last error is
/// returned once attempts are exhausted or a non-retryable error occurs.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn SettingsSleeper,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && is_retryable(&error) => {
                let delay = policy.delay_after(attempt);
                debug!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "retrying after failure"
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
