// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Retry with exponential backoff.
//!
//! Every remote call runs through a small state machine:
//!
//! ```text
//! Pending -> Sent -> Success
//!                 -> RetryableFailure -> (backoff) -> Pending
//!                 -> FatalFailure
//! ```
//!
//! A retryable failure that exhausts the attempt budget also ends in a fatal
//! failure. The delay before retry `k` (0-based) is `base * 2^k`, scaled by a
//! jitter factor drawn from `[1 - spread, 1 + spread]`.
//!
//! Sleeping and jitter are injected through [`Sleep`] and [`Jitter`] so the
//! whole loop can be driven without real time passing.

use crate::{config::RetrySettings, publish::ApiError};

use async_trait::async_trait;
use rand::Rng;
use std::{collections::BTreeSet, future::Future, time::Duration};
use tracing::{debug, warn};

/// Retry budget and failure classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the initial one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Relative jitter spread.
    pub jitter: f64,

    /// HTTP status codes worth retrying.
    pub retryable: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            jitter: settings.jitter,
            retryable: settings.retryable.iter().copied().collect(),
        }
    }
}

impl RetryPolicy {
    /// Check if failure is transient.
    ///
    /// Timeouts and connection failures always count as transient. Status
    /// failures are transient only when listed in the retryable set.
    pub fn is_retryable(&self, error: &ApiError) -> bool {
        match error {
            ApiError::Status { status, .. } => self.retryable.contains(status),
            ApiError::Timeout => true,
            ApiError::Transport(err) => err.is_connect(),
            ApiError::Decode(_) => false,
        }
    }

    /// Compute delay before 0-based retry with given jitter factor.
    pub fn delay(&self, retry: u32, factor: f64) -> Duration {
        let nanos = self.base_delay.as_nanos() as f64 * 2f64.powi(retry as i32) * factor.max(0.0);
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Lowest and highest possible delay before 0-based retry.
    pub fn delay_bounds(&self, retry: u32) -> (Duration, Duration) {
        (
            self.delay(retry, 1.0 - self.jitter),
            self.delay(retry, 1.0 + self.jitter),
        )
    }
}

/// Suspend between attempts.
#[async_trait]
pub trait Sleep: Send + Sync {
    /// Wait for given delay.
    async fn sleep(&self, delay: Duration);
}

/// Sleep on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleep;

#[async_trait]
impl Sleep for TokioSleep {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Source of jitter factors.
pub trait Jitter: Send + Sync {
    /// Draw factor from `[1 - spread, 1 + spread]`.
    fn factor(&self, spread: f64) -> f64;
}

/// Uniformly random jitter.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn factor(&self, spread: f64) -> f64 {
        rand::rng().random_range((1.0 - spread)..=(1.0 + spread))
    }
}

/// Classified result of one sent attempt.
enum Outcome<T> {
    Success(T),
    RetryableFailure(ApiError),
    FatalFailure(ApiError),
}

/// Drive remote operations through the retry state machine.
#[derive(Debug, Clone)]
pub struct Retrier<S = TokioSleep, J = RandomJitter> {
    policy: RetryPolicy,
    sleep: S,
    jitter: J,
}

impl Retrier {
    /// Construct new retrier sleeping on tokio with random jitter.
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_backoff(policy, TokioSleep, RandomJitter)
    }
}

impl<S, J> Retrier<S, J>
where
    S: Sleep,
    J: Jitter,
{
    /// Construct new retrier with custom sleep and jitter.
    pub fn with_backoff(policy: RetryPolicy, sleep: S, jitter: J) -> Self {
        Self {
            policy,
            sleep,
            jitter,
        }
    }

    /// Retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run operation until it succeeds, fails fatally, or runs out of attempts.
    ///
    /// # Errors
    ///
    /// - Return [`RetryError::Fatal`] on first non-transient failure.
    /// - Return [`RetryError::Exhausted`] if every attempt failed transiently.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            // INVARIANT: Pending -> Sent.
            attempt += 1;
            debug!("{label}: attempt {attempt}/{}", self.policy.max_attempts);
            let outcome = match operation().await {
                Ok(value) => Outcome::Success(value),
                Err(err) if self.policy.is_retryable(&err) => Outcome::RetryableFailure(err),
                Err(err) => Outcome::FatalFailure(err),
            };

            match outcome {
                Outcome::Success(value) => return Ok(value),
                Outcome::FatalFailure(source) => {
                    return Err(RetryError::Fatal {
                        attempts: attempt,
                        source,
                    })
                }
                Outcome::RetryableFailure(source) if attempt >= self.policy.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source,
                    })
                }
                Outcome::RetryableFailure(source) => {
                    let factor = self.jitter.factor(self.policy.jitter);
                    let delay = self.policy.delay(attempt - 1, factor);
                    warn!("{label}: attempt {attempt} failed ({source}), retry in {delay:?}");
                    self.sleep.sleep(delay).await;
                }
            }
        }
    }
}

/// Retry error types.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// Operation failed with non-transient failure.
    #[error("failed after {attempts} attempt(s)")]
    Fatal {
        attempts: u32,
        #[source]
        source: ApiError,
    },

    /// Operation kept failing transiently until retry budget ran out.
    #[error("gave up after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        source: ApiError,
    },
}

impl RetryError {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Last failure observed.
    pub fn last_error(&self) -> &ApiError {
        match self {
            Self::Fatal { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = RetryError> = std::result::Result<T, E>;
