use crate::error::PipelineError;
use anyhow::Result;
use futures_util::future::BoxFuture;
use log::warn;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One provider call, re-runnable across retry cycles.
pub type Attempt<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_cycles: u32,
    pub attempt_timeout: Duration,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn single_attempt(timeout: Duration) -> Self {
        Self {
            max_cycles: 1,
            attempt_timeout: timeout,
            base_delay: Duration::ZERO,
        }
    }
}

/// Runs `attempts` in order under a per-attempt deadline, cycling up to
/// `policy.max_cycles` times with a linear backoff (`base_delay * cycle`)
/// between cycles. The first success wins. Cancellation is checked before
/// every attempt and interrupts the backoff wait; once observed, no further
/// attempt is made.
pub async fn invoke_with_fallbacks<T: 'static>(
    operation: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    attempts: &[Attempt<T>],
) -> Result<T> {
    let mut all_timeouts = true;

    for cycle in 1..=policy.max_cycles {
        for (position, attempt) in attempts.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled.into());
            }

            match tokio::time::timeout(policy.attempt_timeout, attempt()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    all_timeouts = false;
                    warn!(
                        "{}: attempt {} failed in cycle {}/{}: {:#}",
                        operation,
                        position + 1,
                        cycle,
                        policy.max_cycles,
                        e
                    );
                }
                Err(_) => {
                    warn!(
                        "{}: attempt {} timed out after {}s in cycle {}/{}",
                        operation,
                        position + 1,
                        policy.attempt_timeout.as_secs(),
                        cycle,
                        policy.max_cycles
                    );
                }
            }
        }

        if cycle < policy.max_cycles {
            tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled.into()),
                _ = tokio::time::sleep(policy.base_delay * cycle) => {}
            }
        }
    }

    if all_timeouts {
        Err(PipelineError::Timeout {
            operation: operation.to_string(),
            seconds: policy.attempt_timeout.as_secs(),
        }
        .into())
    } else {
        Err(PipelineError::ProviderFailure {
            operation: operation.to_string(),
        }
        .into())
    }
}
