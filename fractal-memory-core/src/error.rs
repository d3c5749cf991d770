//! Error taxonomy for the hierarchical memory core.
//!
//! Mirrors the failure classes of the design: validation errors are never
//! retried, transient dependency errors are retried with backoff before
//! surfacing as [`Error::StoreUnavailable`], and cancellation always
//! propagates rather than being swallowed.

/// Result type alias for memory core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the hierarchical memory core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad input: out-of-range importance, empty content, unknown user, etc.
    #[error("validation error: {0}")]
    Validation(String),

    /// A volatile or graph store operation exhausted its retry budget.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// All retriever arms failed.
    #[error("retriever unavailable: {0}")]
    RetrieverUnavailable(String),

    /// A unique-identifier collision or missing-schema condition was observed.
    #[error("integrity error: {0}")]
    IntegrityError(String),

    /// The caller's deadline expired or the operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error represents a transient condition worth retrying.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::StoreUnavailable(_) | Error::RetrieverUnavailable(_) | Error::Io(_) => true,
            Error::Validation(_)
            | Error::IntegrityError(_)
            | Error::Cancelled
            | Error::NotFound(_)
            | Error::Serialization(_) => false,
        }
    }
}
