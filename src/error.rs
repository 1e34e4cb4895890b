//! Error types for the weft engine.

use thiserror::Error;

/// Main error type for weft operations.
#[derive(Error, Debug)]
pub enum WeftError {
    /// An id was requested that the store does not know.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An invariant would be violated: dangling relationship, unknown
    /// taxonomy type, duplicate id.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A concurrent promotion won the race for the same logical candidate.
    /// Callers retry as reinforcement of `existing_id` rather than surfacing
    /// this to the end user.
    #[error("promotion conflict: candidate {candidate_id} lost to {existing_id}")]
    Conflict {
        candidate_id: String,
        existing_id: String,
    },

    /// A single fragment alone exceeds the total token budget.
    #[error("fragment of ~{fragment_tokens} tokens exceeds total budget of {budget}")]
    BudgetExceeded {
        fragment_tokens: usize,
        budget: usize,
    },

    /// The external extraction capability failed or timed out. The source
    /// document reference is preserved so the document can be retried.
    #[error("extraction failed for document {source_ref}: {message}")]
    UpstreamExtraction {
        source_ref: String,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WeftError {
    /// Shorthand for a [`WeftError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        WeftError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Shorthand for a [`WeftError::Constraint`].
    pub fn constraint(message: impl Into<String>) -> Self {
        WeftError::Constraint(message.into())
    }
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Result type alias for weft operations.
pub type Result<T> = std::result::Result<T, WeftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WeftError::not_found("entity", "e-42");
        assert_eq!(err.to_string(), "entity not found: e-42");

        let err = WeftError::BudgetExceeded {
            fragment_tokens: 900,
            budget: 500,
        };
        assert!(err.to_string().contains("900"));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WeftError = io_err.into();
        assert!(matches!(err, WeftError::Io(_)));
    }

    #[test]
    fn test_extraction_error_keeps_source_ref() {
        let err = WeftError::UpstreamExtraction {
            source_ref: "doc-7".to_string(),
            message: "timeout".to_string(),
        };
        assert!(err.to_string().contains("doc-7"));
    }
}
