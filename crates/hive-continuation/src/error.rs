//! Error types for continuation control

/// Result type for continuation operations
pub type Result<T> = std::result::Result<T, ContinuationError>;

/// Safety-limit stops surfaced as errors
///
/// The engine itself never fails; these exist for callers that treat a
/// guard-forced termination as a hard error rather than a completed task.
#[derive(Debug, thiserror::Error)]
pub enum ContinuationError {
    /// The iteration cap stopped the sequence
    #[error("Max iterations exceeded: {0}")]
    MaxIterationsExceeded(usize),

    /// The no-progress guard stopped the sequence
    #[error("No progress detected over {0} turns")]
    NoProgressDetected(usize),
}
