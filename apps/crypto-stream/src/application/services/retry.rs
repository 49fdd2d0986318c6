//! Retry Policy
//!
//! Delay schedule shared by the connection supervisor and the feed client's
//! reconnect loop. Retries never run out: callers keep asking for delays
//! until they connect or are cancelled. The default schedule is a fixed
//! 5 second delay with no jitter.

use std::time::Duration;

use rand::Rng;

/// Fixed retry delay used throughout the pipeline.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor per attempt (1.0 keeps the delay fixed).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_DELAY)
    }
}

impl RetryConfig {
    /// Constant delay.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Exponential backoff doubling from `initial_delay` up to `max_delay`, with ±10% jitter.
    #[must_use]
    pub const fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }

    /// Same schedule with a different jitter factor, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_jitter(self, jitter_factor: f64) -> Self {
        let jitter_factor = if jitter_factor.is_finite() {
            jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            jitter_factor,
            ..self
        }
    }
}

/// Stateful retry schedule.
///
/// # Example
///
/// ```rust
/// use crypto_stream::application::services::retry::{RetryConfig, RetryPolicy};
/// use std::time::Duration;
///
/// let mut policy = RetryPolicy::new(RetryConfig::default());
///
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
///
/// // Connection succeeded
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl RetryPolicy {
    /// Create a new retry policy.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Delay to wait before the next attempt.
    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);

        let delay_with_jitter = self.apply_jitter(self.current_delay);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        self.current_delay = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        delay_with_jitter
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Number of delays handed out since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
