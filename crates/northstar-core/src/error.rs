use thiserror::Error;

/// Top-level error type for the NorthStar workspace.
///
/// Subsystem crates define their own error types and convert at the crate
/// seam so the `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NorthstarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for NorthstarError {
    fn from(err: toml::de::Error) -> Self {
        NorthstarError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for NorthstarError {
    fn from(err: toml::ser::Error) -> Self {
        NorthstarError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for NorthstarError {
    fn from(err: serde_json::Error) -> Self {
        NorthstarError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for NorthStar operations.
pub type Result<T> = std::result::Result<T, NorthstarError>;

/// Failure of a retrieval, search or conversation-store call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CapabilityError {
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("capability timed out after {0} ms")]
    Timeout(u64),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl From<NorthstarError> for CapabilityError {
    fn from(err: NorthstarError) -> Self {
        CapabilityError::Unavailable(err.to_string())
    }
}

/// Classified failure of a generation call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("generation timed out after {0} ms")]
    Timeout(u64),

    #[error("generation refused: {0}")]
    Refused(String),

    #[error("generation transport error: {0}")]
    Transport(String),
}
