//! Error types for the intake flow.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Stale state: {0}")]
    StaleState(#[from] StaleStateError),
}

/// Configuration-related errors, including catalog loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Local answer validation failures. Never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{label} is required")]
    Required { label: String },

    #[error("{label} must be at least {min} characters")]
    TooShort { label: String, min: usize },
}

/// Session adapter failures. Recoverable: the draft keeps the attempted values.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmissionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Submission rejected: {0}")]
    Rejected(String),

    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<DatabaseError> for SubmissionError {
    fn from(e: DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}

/// A structural precondition is missing. Fatal for the current attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StaleStateError {
    #[error("No session is available for this intake")]
    MissingSession,

    #[error("Step {0} is not part of the catalog")]
    UnknownStep(String),

    #[error("Question {0} is not the active question")]
    InactiveQuestion(String),

    #[error("Step {0} is no longer active")]
    InactiveStep(String),

    #[error("No step is active")]
    NoActiveStep,
}

/// Result type alias for the intake flow.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages() {
        let required = ValidationError::Required {
            label: "Company name".into(),
        };
        assert_eq!(required.to_string(), "Company name is required");

        let short = ValidationError::TooShort {
            label: "Pitch".into(),
            min: 10,
        };
        assert_eq!(short.to_string(), "Pitch must be at least 10 characters");
    }

    #[test]
    fn database_error_converts_into_submission_error() {
        let err: SubmissionError = DatabaseError::Query("boom".into()).into();
        assert!(matches!(err, SubmissionError::Storage(ref m) if m.contains("boom")));
    }
}
