//! Domain-level error taxonomy for skillgate.

/// Errors produced while reading a document header.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("metadata header is not closed by a `---` line")]
    Unterminated,

    #[error("metadata header is not valid YAML: {0}")]
    InvalidYaml(String),

    #[error("metadata header must be a mapping, found {found}")]
    NotAMapping { found: String },
}

/// skillgate domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SkillgateError {
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("document header error: {0}")]
    Header(#[from] HeaderError),

    #[error("report already persisted: {0}")]
    ReportExists(String),

    #[error("report not found: {0}")]
    ReportNotFound(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for skillgate domain operations.
pub type Result<T> = std::result::Result<T, SkillgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skillgate_error_display() {
        let err = SkillgateError::InvalidTopic("empty".to_string());
        assert!(err.to_string().contains("invalid topic"));

        let err = SkillgateError::Collaborator("generator unreachable".to_string());
        assert!(err.to_string().contains("generator unreachable"));
    }

    #[test]
    fn test_header_error_wraps() {
        let err: SkillgateError = HeaderError::Unterminated.into();
        assert!(err.to_string().contains("not closed"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = SkillgateError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }
}
