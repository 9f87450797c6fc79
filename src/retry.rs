//! Explicit retry policy, replacing ad-hoc `setTimeout`-driven retries with
//! a single object: `maxAttempts`, `baseBackoff`, `cap`, `classify`.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{ErrorClass, OddysseyError};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration, cap: Duration) -> Self {
        Self { max_attempts, base_backoff, cap }
    }

    pub fn from_config(max_attempts: u32, base_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            base_backoff: Duration::from_millis(base_backoff_ms),
            cap: Duration::from_secs(30),
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_backoff.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        std::cmp::min(scaled, self.cap)
    }

    /// Runs `op` up to `max_attempts` times, retrying only while the error
    /// classifies as [`ErrorClass::Transient`]. Fatal errors return
    /// immediately on the first attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, OddysseyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OddysseyError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if e.classify() != ErrorClass::Transient || attempt >= self.max_attempts {
                        return Err(e);
                    }
                    let wait = self.backoff_for(attempt);
                    warn!(
                        "{label} failed transiently on attempt {attempt}/{}: {e}. retrying in {:?}",
                        self.max_attempts, wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(3, 250)
    }
}
