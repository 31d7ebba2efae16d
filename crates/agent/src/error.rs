use thiserror::Error;

use closetmind_db::RepositoryError;

use crate::guard::ResourceExhausted;

/// The only failures `Coordinator::handle` surfaces. Validation failures and
/// transient generation errors are absorbed by the retry-then-fallback
/// policy and never reach the caller.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A lease could not be obtained within the wait window. Retryable by
    /// the caller; never retried internally.
    #[error(transparent)]
    ResourceExhausted(#[from] ResourceExhausted),
    /// The history store failed; fatal for the current request.
    #[error("conversation history unavailable: {0}")]
    History(#[from] RepositoryError),
    /// Serializing the result variant failed before persistence.
    #[error("failed to encode assistant result: {0}")]
    Encode(#[from] serde_json::Error),
}
