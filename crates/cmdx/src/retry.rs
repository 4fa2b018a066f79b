//! Retrying task work that fails with an error.

use std::time::Duration;

use crate::task::{Halt, WorkResult};

/// Delay between retry attempts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackoffPolicy {
    /// No delay between retries.
    #[default]
    None,
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential { base: Duration, max: Duration },
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::None => Duration::ZERO,
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let millis = (base.as_millis() as u64).saturating_mul(2u64.saturating_pow(attempt));
                Duration::from_millis(millis).min(*max)
            }
        }
    }
}

/// Call `f` up to `max_retries + 1` times.
///
/// Only [`Halt::Error`] is retried; skips, failures and throws are final.
/// Returns the last result and the number of retries performed.
pub fn run_with_retries<F>(mut f: F, max_retries: u32, policy: &BackoffPolicy, task: &str) -> (WorkResult, u32)
where
    F: FnMut() -> WorkResult,
{
    let mut attempt = 0;
    loop {
        match f() {
            Err(Halt::Error(cause)) if attempt < max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    task,
                    attempt = attempt + 1,
                    delay_ms = %delay.as_millis(),
                    error = %cause,
                    "Task work failed, retrying"
                );
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
            result => return (result, attempt),
        }
    }
}
