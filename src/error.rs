//! Error types for the hybrid retrieval engine.

use std::fmt;

/// The single error type surfaced across the build, query, and mutation paths.
///
/// Per-document failures during build and per-candidate failures during
/// scoring are recovered locally (counted, not propagated) and never
/// construct one of these; see [`crate::engine::BuildReport`].
#[derive(Debug, Clone)]
pub enum EngineError {
    /// A caller-supplied argument failed validation: empty query, `k` out of
    /// range, an unrecognized filter field, or an embedding dimension mismatch.
    Validation(String),
    /// The embedder failed or returned a malformed matrix for a query.
    EmbeddingFailure(String),
    /// A query ran before any build or load completed for this engine.
    IndexNotReady,
    /// A snapshot read or write failed.
    IndexIO(String),
    /// The operation was cancelled via its `CancellationToken` before completing.
    Cancelled,
    /// The operation exceeded its deadline.
    Timeout,
    /// An invariant was violated that indicates a bug rather than bad input.
    /// Carries the generation id active when the violation was observed.
    Internal { generation: u64, message: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation error: {msg}"),
            EngineError::EmbeddingFailure(msg) => write!(f, "embedding failure: {msg}"),
            EngineError::IndexNotReady => write!(f, "index not ready: no build or load has completed"),
            EngineError::IndexIO(msg) => write!(f, "index I/O error: {msg}"),
            EngineError::Cancelled => write!(f, "operation cancelled"),
            EngineError::Timeout => write!(f, "operation timed out"),
            EngineError::Internal { generation, message } => {
                write!(f, "internal error (generation {generation}): {message}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn embedding_failure(msg: impl Into<String>) -> Self {
        EngineError::EmbeddingFailure(msg.into())
    }

    pub fn index_io(msg: impl Into<String>) -> Self {
        EngineError::IndexIO(msg.into())
    }

    pub fn internal(generation: u64, msg: impl Into<String>) -> Self {
        EngineError::Internal { generation, message: msg.into() }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_context() {
        let e = EngineError::validation("k must be >= 1");
        assert!(e.to_string().contains("k must be >= 1"));

        let e = EngineError::internal(7, "tombstone count negative");
        assert!(e.to_string().contains("generation 7"));
    }

    #[test]
    fn index_not_ready_has_stable_message() {
        assert_eq!(
            EngineError::IndexNotReady.to_string(),
            "index not ready: no build or load has completed"
        );
    }
}
