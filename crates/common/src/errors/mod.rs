//! Error types for RefNet
//!
//! Provides the error taxonomy shared by the record source, the adapter and
//! the graph engine:
//! - Distinct error types for the different failure modes
//! - Transient vs permanent classification for retry decisions
//! - Error codes for client handling

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    InvalidIdentifier,
    ValidationError,

    // Resource errors (4xxx)
    PaperNotFound,
    NodeNotFound,
    RootUnresolvable,

    // Conflict errors (5xxx)
    Duplicate,

    // Rate limiting (6xxx)
    RateLimited,

    // External service errors (8xxx)
    UpstreamError,
    MalformedRecord,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::InvalidIdentifier => 1001,
            ErrorCode::ValidationError => 1002,

            ErrorCode::PaperNotFound => 4001,
            ErrorCode::NodeNotFound => 4002,
            ErrorCode::RootUnresolvable => 4003,

            ErrorCode::Duplicate => 5001,

            ErrorCode::RateLimited => 6001,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::MalformedRecord => 8002,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Invalid paper identifier: {input:?}")]
    InvalidIdentifier { input: String },

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Resource errors
    #[error("Paper not found: {id}")]
    PaperNotFound { id: String },

    #[error("Paper not in graph: {id}")]
    NodeNotFound { id: String },

    #[error("Could not fetch any root paper: {}", roots.join(", "))]
    RootUnresolvable { roots: Vec<String> },

    // Conflict errors
    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    // Record source errors
    #[error("Rate limited by record source {source_name}")]
    RateLimited { source_name: String },

    #[error("Record source error: {message}")]
    Upstream { message: String, transient: bool },

    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] RecordRejection),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::InvalidIdentifier { .. } => ErrorCode::InvalidIdentifier,
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::PaperNotFound { .. } => ErrorCode::PaperNotFound,
            AppError::NodeNotFound { .. } => ErrorCode::NodeNotFound,
            AppError::RootUnresolvable { .. } => ErrorCode::RootUnresolvable,
            AppError::Duplicate { .. } => ErrorCode::Duplicate,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Upstream { .. } | AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::MalformedRecord(_) => ErrorCode::MalformedRecord,
            AppError::Other(_) => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Whether a retry of the same call could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::RateLimited { .. } => true,
            AppError::Upstream { transient, .. } => *transient,
            // An undecodable body will not decode on the next attempt either
            AppError::HttpClient(e) if e.is_decode() => false,
            AppError::HttpClient(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(true, |s| s.is_server_error())
            }
            _ => false,
        }
    }

    /// Whether the source asked us to slow down
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::RateLimited { .. })
    }
}

/// Reason a raw record could not be turned into a paper
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordRejection {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record has no usable id")]
    MissingId,

    #[error("field `{field}` has an unexpected shape")]
    InvalidField { field: &'static str },
}

impl RecordRejection {
    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            RecordRejection::NotAnObject => "not_an_object",
            RecordRejection::MissingId => "missing_id",
            RecordRejection::InvalidField { .. } => "invalid_field",
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::NodeNotFound { id: "W1".into() };
        assert_eq!(err.code(), ErrorCode::NodeNotFound);
        assert_eq!(err.code().as_code(), 4002);
    }

    #[test]
    fn test_transient_classification() {
        let limited = AppError::RateLimited {
            source_name: "openalex".into(),
        };
        assert!(limited.is_transient());
        assert!(limited.is_rate_limited());

        let server = AppError::Upstream {
            message: "502".into(),
            transient: true,
        };
        assert!(server.is_transient());
        assert!(!server.is_rate_limited());

        let bad_request = AppError::Upstream {
            message: "400".into(),
            transient: false,
        };
        assert!(!bad_request.is_transient());

        let invalid = AppError::InvalidIdentifier { input: " ".into() };
        assert!(!invalid.is_transient());
    }

    #[test]
    fn test_validation_is_permanent() {
        let err = AppError::Validation {
            message: "page must be a positive integer".into(),
            field: Some("page".into()),
        };
        assert_eq!(err.code().as_code(), 1002);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_root_unresolvable_message() {
        let err = AppError::RootUnresolvable {
            roots: vec!["W1".into(), "W2".into()],
        };
        assert_eq!(err.to_string(), "Could not fetch any root paper: W1, W2");
    }

    #[test]
    fn test_rejection_converts() {
        let err: AppError = RecordRejection::MissingId.into();
        assert_eq!(err.code(), ErrorCode::MalformedRecord);
        assert_eq!(RecordRejection::InvalidField { field: "title" }.label(), "invalid_field");
    }
}
