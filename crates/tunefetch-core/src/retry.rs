//! Per-endpoint retry schedule: attempt limits, scaled timeouts and backoff.

use std::time::Duration;

/// Pause inserted between two attempts on the same endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same pause after every failed attempt.
    Fixed { delay: Duration },
    /// `base * factor^attempt`, capped at `max`, optionally spread by +/- 50%.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed {
            delay: Duration::from_millis(300),
        }
    }
}

impl Backoff {
    /// Pause after the failed 0-based `attempt`.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let capped = (base.as_secs_f64() * factor.powi(exponent)).min(max.as_secs_f64());
                if jitter {
                    // Uniform in [0.5, 1.5) of the capped delay.
                    Duration::from_secs_f64(capped * (0.5 + fastrand::f64()))
                } else {
                    Duration::from_secs_f64(capped)
                }
            }
        }
    }
}

/// What the orchestrator should do for one attempt on one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPlan {
    /// Timeout applied to this attempt.
    pub timeout: Duration,
    /// Whether this attempt may be made at all.
    pub permitted: bool,
}

/// Retry policy applied independently to every endpoint candidate.
///
/// Attempt `n` (0-based) runs with `base_timeout * (n + 1)`. The backoff
/// delay is only inserted between attempts on the same endpoint; moving on
/// to the next endpoint happens immediately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed per endpoint. Zero is treated as one.
    pub max_attempts: u32,
    /// Timeout of the first attempt.
    pub base_timeout: Duration,
    /// Pause between attempts on the same endpoint.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_timeout: Duration::from_millis(3_000),
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt per endpoint.
    pub fn single_attempt(base_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            base_timeout,
            ..Self::default()
        }
    }

    pub fn with_base_timeout(mut self, base_timeout: Duration) -> Self {
        self.base_timeout = base_timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn permits(&self, attempt: u32) -> bool {
        attempt < self.attempt_limit()
    }

    /// Timeout for the given 0-based attempt.
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        self.base_timeout
            .checked_mul(attempt.saturating_add(1))
            .unwrap_or(Duration::MAX)
    }

    pub fn plan(&self, attempt: u32) -> AttemptPlan {
        AttemptPlan {
            timeout: self.timeout_for(attempt),
            permitted: self.permits(attempt),
        }
    }

    /// Delay to wait after `attempt` failed, or `None` when the endpoint is exhausted.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if self.permits(attempt.saturating_add(1)) {
            Some(self.backoff.delay(attempt))
        } else {
            None
        }
    }
}
