//! # Retry Policy
//!
//! One configurable abstraction for every bounded retry in the engine: transient store
//! conflicts, lock acquisition, runner HTTP calls and destructive teardown.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pipeline_engine::resilience::RetryPolicy;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::exponential("teardown", 15, Duration::from_secs(5), Duration::from_secs(60));
//! let value = policy
//!     .execute(|| async { Ok::<_, String>(42) }, |_err| true)
//!     .await?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

use crate::config::{BackoffKind, RetryPoliciesConfig, RetryPolicyConfig};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    name: String,
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(name: impl Into<String>, max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            name: name.into(),
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn fixed(name: impl Into<String>, max_attempts: u32, delay: Duration) -> Self {
        Self::new(name, max_attempts, Backoff::Fixed(delay))
    }

    pub fn exponential(
        name: impl Into<String>,
        max_attempts: u32,
        initial: Duration,
        max: Duration,
    ) -> Self {
        Self::new(
            name,
            max_attempts,
            Backoff::Exponential {
                initial,
                max,
                multiplier: 2.0,
            },
        )
    }

    pub fn from_config(name: impl Into<String>, config: &RetryPolicyConfig) -> Self {
        let initial = Duration::from_millis(config.initial_delay_ms);
        let backoff = match config.backoff {
            BackoffKind::Fixed => Backoff::Fixed(initial),
            BackoffKind::Exponential => Backoff::Exponential {
                initial,
                max: Duration::from_millis(config.max_delay_ms),
                multiplier: config.multiplier,
            },
        };
        Self::new(name, config.max_attempts, backoff)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given (1-based) attempt failed
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1).min(63) as i32;
                let scaled = initial.as_secs_f64() * multiplier.powi(exponent);
                if !scaled.is_finite() || scaled >= max.as_secs_f64() {
                    *max
                } else {
                    Duration::from_secs_f64(scaled)
                }
            }
        }
    }

    /// Run `operation` until it succeeds, fails with an error `is_retryable` rejects, or
    /// attempts run out. The last error is returned.
    pub async fn execute<T, E, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(policy = %self.name, attempt, "🟢 Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if attempt < self.max_attempts && is_retryable(&error) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        policy = %self.name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "🔁 Retrying operation"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    if attempt >= self.max_attempts {
                        warn!(
                            policy = %self.name,
                            attempts = attempt,
                            error = %error,
                            "Retry attempts exhausted"
                        );
                    }
                    return Err(error);
                }
            }
        }
    }
}

/// Named policies built from configuration at start-up
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicies {
    pub store: RetryPolicy,
    pub runner_http: RetryPolicy,
    pub teardown: RetryPolicy,
}

impl RetryPolicies {
    pub fn from_config(config: &RetryPoliciesConfig) -> Self {
        Self {
            store: RetryPolicy::from_config("store", &config.store),
            runner_http: RetryPolicy::from_config("runner_http", &config.runner_http),
            teardown: RetryPolicy::from_config("teardown", &config.teardown),
        }
    }
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self::from_config(&RetryPoliciesConfig::default())
    }
}
