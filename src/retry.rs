//! Bounded retry for operations that can hit transient contention.

use std::time::Duration;
use thiserror::Error;

/// Errors that know whether trying again could succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Outcome of a retried operation that did not succeed.
#[derive(Error, Debug)]
pub enum RetryError<E: std::error::Error + 'static> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error(transparent)]
    Fatal(E),
}

/// Fixed back-off retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget runs out. Sleeps `backoff` between attempts.
    pub async fn run<T, E, F>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Transient + std::error::Error + 'static,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(RetryError::Fatal(e)),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted { attempts: attempt, last: e });
                }
                Err(e) => {
                    tracing::warn!(
                        "Transient failure (attempt {}/{}): {}",
                        attempt,
                        self.max_attempts,
                        e
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
