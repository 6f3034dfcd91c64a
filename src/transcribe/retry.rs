use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Result, VidsubError};

/// Bounded exponential backoff applied to rate-limited requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based). A server-provided hint
    /// is honoured when it is longer; the result never exceeds `max_backoff`.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let backoff = self
            .initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff);
        let delay = match hint {
            Some(hint) => backoff.max(hint),
            None => backoff,
        };
        delay.min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let hint = match &e {
                        VidsubError::RateLimit { retry_after, .. } => *retry_after,
                        _ => None,
                    };
                    let delay = self.delay_for(attempt, hint);
                    warn!(
                        "{}: attempt {}/{} failed: {}; retrying in {:.1}s",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
