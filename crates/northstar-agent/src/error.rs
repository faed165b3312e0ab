//! Error types for the query pipeline.

use northstar_core::error::{CapabilityError, GenerationError};

/// Failure classes of the pipeline.
///
/// Only `MalformedRequest` ever leaves the orchestrator. The other variants
/// are produced and absorbed inside the stage that owns them, and surface
/// only in logs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    #[error("Classification unavailable: {0}")]
    ClassificationUnavailable(String),
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(#[from] CapabilityError),
    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),
    #[error("Generation failed: {0}")]
    GenerationFailure(#[from] GenerationError),
    #[error("Persistence failed: {0}")]
    PersistenceFailure(String),
}

impl AgentError {
    /// True for input errors the caller must fix.
    pub fn is_malformed(&self) -> bool {
        matches!(self, AgentError::MalformedRequest(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_malformed_is_malformed() {
        assert!(AgentError::MalformedRequest("empty".into()).is_malformed());
        assert!(!AgentError::SearchUnavailable("down".into()).is_malformed());
        assert!(!AgentError::PersistenceFailure("disk".into()).is_malformed());
    }

    #[test]
    fn test_capability_conversions() {
        let err: AgentError = CapabilityError::Timeout(10).into();
        assert!(matches!(err, AgentError::RetrievalUnavailable(_)));
        let err: AgentError = GenerationError::Refused("no".into()).into();
        assert_eq!(err.to_string(), "Generation failed: generation refused: no");
    }
}
