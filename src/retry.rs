//! Retry policy for transient failures
//!
//! Wraps a fallible async operation with a bounded number of retries and an
//! exponential backoff schedule. Only errors reporting `is_transient()` are
//! retried; everything else is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::{Result, ScoutError};

/// Retry settings for one kind of operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Backoff before retry number `retry` (1-based), without jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    fn jittered(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        let spread = (base.as_millis() as u64) / 4;
        if spread == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=spread);
        (base + Duration::from_millis(jitter)).min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    /// Returns the final result together with the number of attempts made.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> (Result<T>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.jittered(attempt);
                    debug!(
                        "{} failed: {} (attempt {}/{}), retrying in {:?}",
                        label, e, attempt, max_attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

/// Map an I/O error kind to transience for connect-through-proxy failures
pub(crate) fn io_is_transient(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::UnexpectedEof
    )
}

pub(crate) fn connect_error(err: &std::io::Error, context: &str) -> ScoutError {
    ScoutError::ValidationConnect {
        message: format!("{}: {}", context, err),
        transient: io_is_transient(err),
    }
}
