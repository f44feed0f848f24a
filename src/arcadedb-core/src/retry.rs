//! Bounded retry with exponential backoff.
//!
//! ```text
//! ATTEMPT(n) --success--------------------------------> DONE
//! ATTEMPT(n) --transient, n < max_retries-------------> WAIT(backoff(n)) -> ATTEMPT(n+1)
//! ATTEMPT(n) --transient, n == max_retries------------> FAILED(last error)
//! ATTEMPT(n) --non-transient--------------------------> FAILED(error)
//! ```
//!
//! Waiting goes through a [`Sleeper`] so the schedule can be observed in
//! tests without real time passing.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::Result;

/// Source of backoff waits.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_retries(), config.retry_base_delay(), config.retry_max_delay())
            .with_jitter(config.retry_jitter())
    }

    /// Add up to 10% random delay on top of each backoff, still capped at
    /// the ceiling.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry `n` (0-based): `base * 2^n`, capped at the ceiling.
    pub fn backoff(&self, n: u32) -> Duration {
        let factor = 2u32.checked_pow(n).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn delay_for(&self, n: u32) -> Duration {
        let delay = self.backoff(n);
        if !self.jitter {
            return delay;
        }

        let jitter_range = delay.as_millis() as u64 / 10;
        if jitter_range == 0 {
            return delay;
        }
        let jittered = delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_range));
        jittered.min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or the budget of
    /// `max_retries + 1` attempts is spent. `op` receives the 0-based
    /// attempt number.
    pub async fn run<T, F, Fut>(&self, sleeper: &dyn Sleeper, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Transient failure on attempt {}/{}: {}; retrying in {:?}",
                        attempt + 1,
                        self.max_retries + 1,
                        err,
                        delay
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        error!("Giving up after {} attempts: {}", attempt + 1, err);
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000), Duration::from_secs(30)).with_jitter(true)
    }
}
