//! Error types for the schema registry client

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::service::ServiceError;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Why a lookup could not be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrievalCause {
    /// Nothing is registered under the requested id or subject
    NotFound,
    /// The backend could not be reached or did not produce a usable answer
    Unavailable,
}

impl fmt::Display for RetrievalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalCause::NotFound => f.write_str("not found"),
            RetrievalCause::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// Schema registry client errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{message} ({cause})")]
    Retrieval {
        message: String,
        cause: RetrievalCause,
        #[source]
        source: Option<ServiceError>,
    },

    #[error("{message}")]
    Registration {
        message: String,
        #[source]
        source: Option<ServiceError>,
    },

    #[error("Not all schemas were loaded into schema registry. Expected: {expected}, Was: {actual}")]
    BatchRegistration {
        expected: usize,
        actual: usize,
        /// Full names of the schemas whose registration failed
        failed: Vec<String>,
    },

    #[error("Timeout ({timeout:?}) occurred while importing schemas; execution was cancelled")]
    Timeout { timeout: Duration },

    #[error("Unexpected failure while running batch import: {0}")]
    Importer(String),

    #[error("Invalid schema format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Avro error: {0}")]
    Avro(#[from] apache_avro::Error),
}

impl SchemaError {
    pub(crate) fn not_found(message: impl Into<String>, source: Option<ServiceError>) -> Self {
        SchemaError::Retrieval {
            message: message.into(),
            cause: RetrievalCause::NotFound,
            source,
        }
    }

    pub(crate) fn unavailable(message: impl Into<String>, source: Option<ServiceError>) -> Self {
        SchemaError::Retrieval {
            message: message.into(),
            cause: RetrievalCause::Unavailable,
            source,
        }
    }

    /// Classify a protocol failure into a retrieval error.
    pub(crate) fn retrieval(message: impl Into<String>, source: ServiceError) -> Self {
        if source.is_not_found() {
            Self::not_found(message, Some(source))
        } else {
            Self::unavailable(message, Some(source))
        }
    }

    /// The retrieval sub-cause, if this is a retrieval failure.
    pub fn retrieval_cause(&self) -> Option<RetrievalCause> {
        match self {
            SchemaError::Retrieval { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.retrieval_cause() == Some(RetrievalCause::NotFound)
    }

    pub fn is_unavailable(&self) -> bool {
        self.retrieval_cause() == Some(RetrievalCause::Unavailable)
    }
}

/// Fail fast on an empty required string argument.
pub(crate) fn require_non_empty(argument: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SchemaError::InvalidArgument(format!(
            "Argument '{}' cannot be empty",
            argument
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_classification() {
        let missing = SchemaError::retrieval(
            "lookup failed",
            ServiceError::Status {
                status: 404,
                error_code: 40401,
                message: "Subject not found".to_string(),
            },
        );
        assert!(missing.is_not_found());
        assert!(!missing.is_unavailable());

        let down = SchemaError::retrieval(
            "lookup failed",
            ServiceError::Transport("connection refused".to_string()),
        );
        assert!(down.is_unavailable());
        assert_eq!(down.to_string(), "lookup failed (unavailable)");
    }

    #[test]
    fn test_batch_message_reports_counts() {
        let err = SchemaError::BatchRegistration {
            expected: 5,
            actual: 3,
            failed: vec!["a.B".to_string(), "a.C".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Not all schemas were loaded into schema registry. Expected: 5, Was: 3"
        );
        assert!(err.retrieval_cause().is_none());
    }

    #[test]
    fn test_timeout_message_keeps_sub_second_precision() {
        let err = SchemaError::Timeout {
            timeout: Duration::from_millis(300),
        };
        assert_eq!(
            err.to_string(),
            "Timeout (300ms) occurred while importing schemas; execution was cancelled"
        );
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("subject", "com.example.Event").is_ok());
        assert!(matches!(
            require_non_empty("subject", "  "),
            Err(SchemaError::InvalidArgument(_))
        ));
    }
}
