use std::future::Future;
use std::time::Duration;

/// How the pause between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Multiplies the interval by `factor` after every failed attempt, up to `max`.
    Exponential { factor: u32, max: Duration },
}

/// A bounded retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval, backoff: Backoff::Fixed }
    }

    /// The pause that follows failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { factor, max } => {
                let multiplier = factor.saturating_pow(attempt.saturating_sub(1));
                self.interval.saturating_mul(multiplier).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl RetryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            RetryOutcome::Succeeded { attempts } | RetryOutcome::Exhausted { attempts } => attempts,
        }
    }
}

/// Calls `op` until it returns `Ok(true)` or the budget runs out.
///
/// The pause only happens between attempts, never after the last one. An `Err` from
/// `op` ends the loop immediately and is returned as-is. Each pause is a plain
/// `tokio::time::sleep`, so dropping the future there cancels cleanly.
pub async fn retry_until<F, Fut, E>(policy: &RetryPolicy, mut op: F) -> Result<RetryOutcome, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    for attempt in 1..=policy.max_attempts {
        if op(attempt).await? {
            return Ok(RetryOutcome::Succeeded { attempts: attempt });
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }
    Ok(RetryOutcome::Exhausted { attempts: policy.max_attempts })
}
