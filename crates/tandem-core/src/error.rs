//! Error types.

/// Tandem error type
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    #[error("Measure registration failed: {0}")]
    Registration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the Tandem crates
pub type TandemResult<T> = Result<T, TandemError>;
