//! Bounded retry with exponential backoff
//!
//! External embedding and generation calls share one policy object instead of
//! hand-rolled loops at each call site. The policy retries only errors its
//! caller classifies as transient.

use std::time::Duration;

/// Bounded exponential backoff policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff delay after a failed attempt (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Run `f` up to `max_attempts` times, sleeping between attempts.
    ///
    /// `is_transient` decides whether a given error is worth retrying;
    /// terminal errors return immediately.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        what: &str,
        is_transient: P,
        mut f: F,
    ) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !is_transient(&err) || attempt + 1 >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying in {}ms: {}",
                        what,
                        attempt + 1,
                        self.max_attempts,
                        delay.as_millis(),
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
