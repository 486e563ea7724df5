//! Error types for stlview

use thiserror::Error;

/// Main error type for stlview operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Invalid STL data: {0}")]
    Format(String),

    #[error("Truncated STL: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Cache I/O error: {0}")]
    CacheIo(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for stlview operations
pub type Result<T> = std::result::Result<T, Error>;

// Coalesced preview requests share one flight's outcome, so errors must be
// clonable. `std::io::Error` is not `Clone`; carry its kind and message.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Fetch(s) => Error::Fetch(s.clone()),
            Error::Format(s) => Error::Format(s.clone()),
            Error::Truncated { expected, actual } => Error::Truncated {
                expected: *expected,
                actual: *actual,
            },
            Error::Encode(s) => Error::Encode(s.clone()),
            Error::CacheIo(s) => Error::CacheIo(s.clone()),
            Error::Gpu(s) => Error::Gpu(s.clone()),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

impl Error {
    /// Whether a retry with the same input can plausibly succeed.
    ///
    /// Encode failures are frequently transient (a rendering context that is
    /// not ready yet); format and truncation failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Encode(_) | Error::Fetch(_) | Error::Gpu(_))
    }
}
