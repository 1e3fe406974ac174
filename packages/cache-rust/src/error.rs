//! Error types for the cache.
//!
//! [`CacheError`] is deliberately `Clone`: a single-flight computation
//! produces one result that is delivered to every waiter, so failures must
//! be fan-out-able without wrapping in `Arc` at every call site.

/// Result alias used throughout the crate.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by cache operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Invalid configuration (zero capacity, unknown algorithm, bad level).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The underlying store reported a failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization, compression, or decompression failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The operation's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation's context deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A user-supplied loader function failed.
    #[error("loader failed: {0}")]
    Loader(String),

    /// Invariant violation inside the cache itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Wraps a loader failure, preserving its display form.
    pub fn loader(err: impl std::fmt::Display) -> Self {
        Self::Loader(err.to_string())
    }

    /// Wraps a codec failure, preserving its display form.
    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms_are_stable() {
        assert_eq!(
            CacheError::Config("max_entries must be positive".to_string()).to_string(),
            "invalid configuration: max_entries must be positive"
        );
        assert_eq!(CacheError::Cancelled.to_string(), "operation cancelled");
        assert_eq!(CacheError::DeadlineExceeded.to_string(), "deadline exceeded");
    }

    #[test]
    fn errors_are_cloneable_and_comparable() {
        let err = CacheError::Loader("boom".to_string());
        let copy = err.clone();
        assert_eq!(err, copy);
    }

    #[test]
    fn loader_helper_preserves_message() {
        let err = CacheError::loader("backend down");
        assert_eq!(err, CacheError::Loader("backend down".to_string()));
    }
}
