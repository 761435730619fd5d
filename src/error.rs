//! Error types for risk scoring

use thiserror::Error;

/// Result type for risk scoring operations
pub type Result<T> = std::result::Result<T, RiskError>;

/// Errors that can occur while configuring or running risk evaluation.
///
/// The scorer itself never fails; every variant originates in configuration,
/// extraction or orchestration.
#[derive(Debug, Error)]
pub enum RiskError {
    /// Malformed criteria, classification or application configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A relationship match key could not be tokenized
    #[error("Badly formed match key: {0}")]
    MalformedMatchKey(String),

    /// Entity fetch or shared-feature lookup failed
    #[error("{collaborator} unavailable: {message}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        message: String,
    },

    /// Score write failed and was rolled back
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A scoring worker thread died before reporting a result
    #[error("Scoring worker failed: {0}")]
    Worker(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (for file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RiskError {
    pub fn config(message: impl Into<String>) -> Self {
        RiskError::Config(message.into())
    }

    pub fn collaborator(collaborator: &'static str, err: impl std::fmt::Display) -> Self {
        RiskError::CollaboratorUnavailable {
            collaborator,
            message: err.to_string(),
        }
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        RiskError::Persistence(err.to_string())
    }

    /// True when the failure only invalidates the entity being evaluated.
    pub fn is_entity_scoped(&self) -> bool {
        matches!(self, RiskError::MalformedMatchKey(_))
    }

    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, RiskError::CollaboratorUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_match_key_errors_are_entity_scoped() {
        assert!(RiskError::MalformedMatchKey("NAME".to_string()).is_entity_scoped());
        assert!(!RiskError::config("bad").is_entity_scoped());
        assert!(!RiskError::persistence("disk full").is_entity_scoped());
        assert!(!RiskError::Worker("gone".to_string()).is_entity_scoped());
    }

    #[test]
    fn test_worker_failure_is_its_own_kind() {
        let err = RiskError::Worker("worker thread panicked".to_string());
        assert!(!err.is_collaborator_failure());
        assert!(!matches!(err, RiskError::Config(_)));
        assert_eq!(err.to_string(), "Scoring worker failed: worker thread panicked");
    }

    #[test]
    fn test_collaborator_message() {
        let err = RiskError::collaborator("shared-feature lookup", "connection reset");
        assert!(err.is_collaborator_failure());
        assert_eq!(
            err.to_string(),
            "shared-feature lookup unavailable: connection reset"
        );
    }
}
