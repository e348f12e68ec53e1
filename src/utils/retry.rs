// src/utils/retry.rs
use std::time::Duration;

use crate::error::PipelineError;

/// Exponential backoff policy for provider calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Drive one operation through the Idle -> InFlight -> {Succeeded |
/// Retrying | Failed} attempt cycle. Only errors classified retryable
/// ([`PipelineError::is_retryable`]) trigger another attempt; the delay
/// doubles per attempt up to `max_delay`.
pub fn run_with_retry<T, F>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, PipelineError>
where
    F: FnMut() -> Result<T, PipelineError>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                tracing::warn!(
                    "{what}: attempt {attempt}/{} failed ({err}), retrying in {:?}",
                    policy.max_attempts,
                    delay
                );
                std::thread::sleep(delay);
                delay = (delay * 2).min(policy.max_delay);
            }
            Err(err) => {
                tracing::debug!("{what}: giving up after attempt {attempt} ({err})");
                return Err(err);
            }
        }
    }
}
