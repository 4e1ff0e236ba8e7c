//! Bounded exponential-backoff retry around a single model call.

use crate::client::{ApiError, CompletionClient, CompletionRequest};
use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(4);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Which failures are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryOn {
    /// Every failure, including authentication and invalid requests
    #[default]
    AnyError,
    /// Only rate limits, server errors, timeouts and broken responses
    Transient,
}

/// Attempt ceiling and backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry, before clamping
    pub base_backoff: Duration,
    /// Lower bound of every delay
    pub min_backoff: Duration,
    /// Upper bound of every delay
    pub max_backoff: Duration,
    /// Which failures are retried
    pub retry_on: RetryOn,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            retry_on: RetryOn::default(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests and dry runs against local servers.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_backoff: Duration::ZERO,
            min_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            retry_on: RetryOn::default(),
        }
    }

    /// Checks that the policy can make at least one attempt.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for zero attempts or inverted bounds.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("max_attempts must be greater than 0"));
        }
        if self.min_backoff > self.max_backoff {
            return Err(Error::config(format!(
                "min_backoff ({:?}) must not exceed max_backoff ({:?})",
                self.min_backoff, self.max_backoff
            )));
        }
        Ok(())
    }

    /// Delay after the given failed attempt (1-based).
    ///
    /// `base * 2^(attempt - 1)`, clamped to `[min_backoff, max_backoff]`.
    /// With the defaults this yields 4s, 4s, 4s, 8s, 10s.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_backoff.saturating_mul(1u32 << exponent);
        delay.clamp(self.min_backoff, self.max_backoff)
    }

    /// Returns true if `err` should be retried under this policy.
    #[must_use]
    pub const fn should_retry(&self, err: &ApiError) -> bool {
        match self.retry_on {
            RetryOn::AnyError => true,
            RetryOn::Transient => err.is_transient(),
        }
    }
}

/// Sends prompts through a [`CompletionClient`] with retry.
#[derive(Debug)]
pub struct RetryingCaller<C> {
    client: C,
    policy: RetryPolicy,
    temperature: f32,
}

impl<C: CompletionClient> RetryingCaller<C> {
    /// Wraps a client.
    pub const fn new(client: C, policy: RetryPolicy, temperature: f32) -> Self {
        Self {
            client,
            policy,
            temperature,
        }
    }

    /// Returns the wrapped client.
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Sends `prompt`, a blank line, then `content` as one user message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] with the last client error once the attempts are
    /// exhausted or a non-retryable error occurs.
    pub fn call(&self, prompt: &str, content: &str) -> Result<String> {
        let request = CompletionRequest {
            message: format!("{prompt}\n\n{content}"),
            temperature: self.temperature,
        };

        let mut attempt = 1;
        loop {
            match self.client.complete(&request) {
                Ok(text) => {
                    debug!("Model call succeeded on attempt {}", attempt);
                    return Ok(text);
                }
                Err(err)
                    if attempt < self.policy.max_attempts && self.policy.should_retry(&err) =>
                {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        "Retrying after error (attempt {}/{}, waiting {:.1}s): {}",
                        attempt,
                        self.policy.max_attempts,
                        delay.as_secs_f64(),
                        err
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(Error::api(attempt, err)),
            }
        }
    }
}
