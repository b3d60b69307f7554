use thiserror::Error;

/// Job-level failure classes. Per-attempt failures stay inside the retry
/// invoker as plain `anyhow` errors; only these cross component boundaries.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0} is not configured")]
    Configuration(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("all providers failed for {operation}")]
    ProviderFailure { operation: String },

    #[error("no segment produced audio")]
    AllSegmentsFailed,

    #[error("generation cancelled")]
    Cancelled,
}

/// True if the error chain bottoms out in cooperative cancellation.
/// The orchestrator must re-raise these instead of skipping to the next
/// segment.
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Cancelled)
    )
}
