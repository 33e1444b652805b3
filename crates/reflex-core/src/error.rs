use thiserror::Error;

/// Top-level error type for the Reflex system.
///
/// Subsystem crates define their own error types and convert into
/// `ReflexError` where they cross crate boundaries, so the `?` operator
/// works end to end.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReflexError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ReflexError {
    fn from(err: serde_json::Error) -> Self {
        ReflexError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ReflexError {
    fn from(err: toml::de::Error) -> Self {
        ReflexError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ReflexError {
    fn from(err: toml::ser::Error) -> Self {
        ReflexError::Config(err.to_string())
    }
}

/// A specialized `Result` type for Reflex operations.
pub type Result<T> = std::result::Result<T, ReflexError>;
