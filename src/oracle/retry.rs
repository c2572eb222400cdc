// file: src/oracle/retry.rs
// description: bounded exponential backoff around fallible oracle calls

use crate::config::RetryConfig;
use crate::oracle::client::OracleError;
use std::time::Duration;
use tracing::{info, warn};

/// Bounded retry schedule: after failed attempt `i` (0-indexed) the caller
/// waits `initial_wait * backoff_multiplier^i` before retrying, up to
/// `max_retries` retries. Fatal errors are never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_wait: Duration,
    pub backoff_multiplier: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_wait: Duration, backoff_multiplier: u32) -> Self {
        Self {
            max_retries,
            initial_wait,
            backoff_multiplier,
        }
    }

    pub fn wait_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_wait * self.backoff_multiplier.pow(attempt)
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_secs(config.initial_wait_secs),
            config.backoff_multiplier,
        )
    }
}

/// Drives `op` until it succeeds, fails fatally, or the retry budget runs
/// out. Returns the last error on exhaustion so the caller can bucket the
/// failure by kind.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> std::result::Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, OracleError>>,
{
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err @ OracleError::Fatal(_)) => {
                warn!("{}: fatal oracle failure, not retrying: {}", label, err);
                return Err(err);
            }
            Err(err) if attempt >= policy.max_retries => {
                warn!(
                    "{}: retry budget exhausted after {} attempts: {}",
                    label,
                    attempt + 1,
                    err
                );
                return Err(err);
            }
            Err(err) => {
                let wait = policy.wait_for_attempt(attempt);
                info!(
                    "{}: attempt {} failed ({}), retrying in {:?}",
                    label,
                    attempt + 1,
                    err,
                    wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
