//! Error types and handling for ekz-tesla
//!
//! This module defines the error types used throughout the crate,
//! providing consistent error handling and reporting.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for ekz-tesla operations
pub type Result<T> = std::result::Result<T, EkzError>;

/// Message the EKZ backend returns while no charging transaction exists yet
pub const TRANSACTION_NOT_FOUND_MESSAGE: &str = "transaction not found in table";

/// Main error type for ekz-tesla
#[derive(Debug, Error)]
pub enum EkzError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Transport-level errors (DNS, connect, timeout); never retried
    #[error("Network error: {message}")]
    Network { message: String },

    /// Non-success HTTP status from one of the upstream APIs
    #[error("unexpected status {status}")]
    Http { status: StatusCode },

    /// API integration errors (EKZ, TeslaMate)
    #[error("API error: {message}")]
    Api { message: String },

    /// Authentication/authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// The bounded token refresh policy refused another attempt
    #[error("Authentication exhausted: {message}")]
    AuthExhausted { message: String },

    /// The live-data endpoint has no transaction for the connector (yet)
    #[error("{}", TRANSACTION_NOT_FOUND_MESSAGE)]
    TransactionNotFound,

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Scheduler lifecycle errors
    #[error("Scheduler error: {message}")]
    Scheduler { message: String },
}

impl EkzError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        EkzError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        EkzError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        EkzError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        EkzError::Network {
            message: message.into(),
        }
    }

    /// Create a new HTTP status error
    pub fn http(status: StatusCode) -> Self {
        EkzError::Http { status }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        EkzError::Api {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        EkzError::Auth {
            message: message.into(),
        }
    }

    /// Create a new auth-exhausted error
    pub fn auth_exhausted<S: Into<String>>(message: S) -> Self {
        EkzError::AuthExhausted {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        EkzError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new scheduler error
    pub fn scheduler<S: Into<String>>(message: S) -> Self {
        EkzError::Scheduler {
            message: message.into(),
        }
    }

    /// Whether this is the "no transaction yet" condition of the live-data endpoint
    pub fn is_transaction_not_found(&self) -> bool {
        matches!(self, EkzError::TransactionNotFound)
    }

    /// Whether the upstream answered 401 Unauthorized
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, EkzError::Http { status } if *status == StatusCode::UNAUTHORIZED)
    }
}

impl From<std::io::Error> for EkzError {
    fn from(err: std::io::Error) -> Self {
        EkzError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for EkzError {
    fn from(err: serde_yaml::Error) -> Self {
        EkzError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EkzError {
    fn from(err: serde_json::Error) -> Self {
        EkzError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for EkzError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EkzError::timeout(err.to_string())
        } else {
            EkzError::network(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for EkzError {
    fn from(err: chrono::ParseError) -> Self {
        EkzError::Validation {
            field: "datetime".to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = EkzError::config("test config error");
        assert!(matches!(err, EkzError::Config { .. }));

        let err = EkzError::auth_exhausted("too many attempts");
        assert!(matches!(err, EkzError::AuthExhausted { .. }));

        let err = EkzError::validation("field", "test validation error");
        assert!(matches!(err, EkzError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = EkzError::config("test error");
        assert_eq!(err.to_string(), "Configuration error: test error");

        let err = EkzError::validation("test_field", "invalid value");
        assert_eq!(err.to_string(), "Validation error: test_field - invalid value");

        let err = EkzError::http(StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "unexpected status 401 Unauthorized");

        assert_eq!(
            EkzError::TransactionNotFound.to_string(),
            "transaction not found in table"
        );
    }

    #[test]
    fn test_classification_helpers() {
        assert!(EkzError::TransactionNotFound.is_transaction_not_found());
        assert!(!EkzError::api("x").is_transaction_not_found());
        assert!(EkzError::http(StatusCode::UNAUTHORIZED).is_unauthorized());
        assert!(!EkzError::http(StatusCode::NOT_FOUND).is_unauthorized());
    }
}
