use std::fmt;
use std::time::Duration;

use tracing::warn;

use crate::primitives::concurrency::InterruptFlag;
use crate::types::{Result, StorageError};

/// Decides whether a failed backend call is attempted again.
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    /// Delay before attempt `attempt + 1` after `err` failed attempt
    /// `attempt` (1-based), or `None` to give up.
    fn next_delay(&self, attempt: u32, err: &StorageError) -> Option<Duration>;
}

/// Never retries.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&self, _attempt: u32, _err: &StorageError) -> Option<Duration> {
        None
    }
}

/// Retries temporary failures up to `max_attempts` total attempts with a
/// constant pause.
#[derive(Clone, Copy, Debug)]
pub struct FixedDelay {
    max_attempts: u32,
    delay: Duration,
}

impl FixedDelay {
    /// Creates the policy; `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl RetryPolicy for FixedDelay {
    fn next_delay(&self, attempt: u32, err: &StorageError) -> Option<Duration> {
        (err.is_temporary() && attempt < self.max_attempts).then_some(self.delay)
    }
}

/// Runs `op` until it succeeds, fails permanently, or `policy` gives up.
///
/// The interrupt flag is checked before every retry; a raised flag ends the
/// loop with [`StorageError::Interrupted`].
pub fn execute_with_retry<T>(
    policy: &dyn RetryPolicy,
    interrupt: &InterruptFlag,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt = 1u32;
    loop {
        let err = match op() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let Some(delay) = policy.next_delay(attempt, &err) else {
            return Err(err);
        };
        warn!(attempt, ?delay, error = %err, "kcv.retry.backoff");
        interrupt.check("retry backoff")?;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        interrupt.check("retry backoff")?;
        attempt += 1;
    }
}
