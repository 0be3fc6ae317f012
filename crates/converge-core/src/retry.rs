use std::time::Duration;

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// `initial * multiplier^(attempt - 1)`, capped at `max`.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: u32,
    },
}

impl Backoff {
    /// Delay to sleep after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(interval) => interval,
            Self::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Bounded retry budget for transient remote errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total time spent retrying before the final unconditional attempt.
    pub budget: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(budget: Duration, backoff: Backoff) -> Self {
        Self { budget, backoff }
    }

    pub fn fixed(budget: Duration, interval: Duration) -> Self {
        Self::new(budget, Backoff::Fixed(interval))
    }

    pub fn exponential(budget: Duration, initial: Duration, max: Duration) -> Self {
        Self::new(
            budget,
            Backoff::Exponential {
                initial,
                max,
                multiplier: 2,
            },
        )
    }
}

impl Default for RetryPolicy {
    /// Two minutes covers typical IAM role propagation.
    fn default() -> Self {
        Self::exponential(
            Duration::from_secs(120),
            Duration::from_millis(500),
            Duration::from_secs(10),
        )
    }
}
