use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

/// Fixed attempt budget with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay_ms: u64) -> Self {
        RetryPolicy { attempts, delay_ms }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        retry(self.attempts, self.delay(), operation).await
    }
}

/// Runs `operation` until it succeeds or `max_attempts` is spent, sleeping
/// `delay` between failures. The attempt number (starting at 1) is passed in.
/// A budget of zero still runs the operation once.
pub async fn retry<T, E, F, Fut>(max_attempts: u32, delay: Duration, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= max_attempts => {
                debug!("attempt {}/{} failed, giving up: {}", attempt, max_attempts, e);
                return Err(e);
            }
            Err(e) => {
                debug!("attempt {}/{} failed: {}", attempt, max_attempts, e);
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
