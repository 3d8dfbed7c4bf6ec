//! Retry logic with exponential backoff for transient failures.
//!
//! Every retry here is bounded: by attempt count and, optionally, by total
//! elapsed time. Callers that need durable store or provider access wrap
//! their acquisition function in a [`RetryExecutor`] instead of looping.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Result, VigilError};

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: usize,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (delay *= multiplier after each retry).
    pub multiplier: f64,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
    /// Optional ceiling on the total time spent retrying.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
            max_elapsed: None,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy used for health store connection acquisition.
    pub fn store_connection() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
            max_elapsed: Some(Duration::from_secs(30)),
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the initial delay before the first retry.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retries.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the multiplier for exponential backoff.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Caps the total time spent across all attempts.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    /// Creates a policy that disables retries (single attempt only).
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Calculates the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        // 2^20 is already far past any sane max_delay
        let safe_attempt = attempt.min(20) as i32;

        let base_delay = self.initial_delay.as_millis() as f64 * self.multiplier.powi(safe_attempt);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // Random value between 50% and 100% of the delay
            let mut rng = rand::thread_rng();
            let jitter_factor = rng.gen_range(0.5..1.0);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Trait for classifying whether an error is retryable.
pub trait RetryClassifier: Send + Sync {
    /// Returns true if the error is transient and the operation should be retried.
    fn is_retryable(&self, error: &VigilError) -> bool;
}

/// Default classifier for network-facing collaborators.
///
/// Retryable: timeouts, transport failures, rate limiting, 5xx provider
/// responses and store connection drops. Everything else (bad input,
/// missing zones, conflicts, parse errors) is permanent.
#[derive(Debug, Clone, Default)]
pub struct NetworkRetryClassifier;

impl NetworkRetryClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl RetryClassifier for NetworkRetryClassifier {
    fn is_retryable(&self, error: &VigilError) -> bool {
        match error {
            VigilError::Timeout(_) => true,
            VigilError::Transport(_) => true,
            VigilError::RateLimited(_) => true,
            VigilError::Io(_) => true,

            VigilError::HttpError(e) => is_transient_reqwest_error(e),
            VigilError::Redis(e) => {
                e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
            }
            VigilError::Provider { status, .. } => *status == 429 || *status >= 500,

            VigilError::DnsError(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("timeout") || lower.contains("temporary")
            }

            VigilError::Config(_)
            | VigilError::InvalidDomain(_)
            | VigilError::InvalidIpAddress(_)
            | VigilError::UnknownBrand(_)
            | VigilError::Store(_)
            | VigilError::DnsResolverError(_)
            | VigilError::ZoneNotFound(_)
            | VigilError::JsonError(_)
            | VigilError::CommandFailed { .. }
            | VigilError::BlockNotFound(_)
            | VigilError::MalformedDeclaration(_)
            | VigilError::UnbalancedBraces(_)
            | VigilError::MalformedDocument(_)
            | VigilError::Conflict(_)
            | VigilError::RetryExhausted { .. }
            | VigilError::Other(_) => false,
        }
    }
}

/// Checks if a reqwest error is transient and worth retrying.
fn is_transient_reqwest_error(error: &reqwest::Error) -> bool {
    if error.is_connect() || error.is_timeout() {
        return true;
    }

    if let Some(status) = error.status() {
        return status.as_u16() == 429 || status.is_server_error();
    }

    if error.is_request() || error.is_body() || error.is_decode() {
        return false;
    }

    true
}

/// Executes operations with retry logic using exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryExecutor<C: RetryClassifier> {
    policy: RetryPolicy,
    classifier: C,
}

impl RetryExecutor<NetworkRetryClassifier> {
    /// Creates a new executor with the default network retry classifier.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            classifier: NetworkRetryClassifier::new(),
        }
    }
}

impl<C: RetryClassifier> RetryExecutor<C> {
    /// Creates a new executor with a custom classifier.
    pub fn with_classifier(policy: RetryPolicy, classifier: C) -> Self {
        Self { policy, classifier }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes an async operation with retry logic.
    ///
    /// Stops at the first non-retryable error, after `max_attempts`, or
    /// when the next delay would overrun `max_elapsed`.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            let e = match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            let is_retryable = self.classifier.is_retryable(&e);
            let attempts_remaining = self.policy.max_attempts.saturating_sub(attempt + 1);
            let delay = self.policy.delay_for_attempt(attempt);
            let out_of_time = self
                .policy
                .max_elapsed
                .is_some_and(|limit| started.elapsed() + delay > limit);

            if !is_retryable || attempts_remaining == 0 || out_of_time {
                if attempt > 0 {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "Operation failed after retries"
                    );
                    return Err(VigilError::RetryExhausted {
                        attempts: attempt + 1,
                        last_error: e.to_string(),
                    });
                }
                return Err(e);
            }

            debug!(
                attempt = attempt + 1,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis(),
                error = %e,
                "Retrying after transient error"
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
