//! Error types for the portfolio backend.
//!
//! This module defines all error types used throughout the crate, together
//! with the HTTP status each one is reported as.

use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

/// The main error type for portfolio operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Request Errors ===
    /// The client supplied a malformed or missing field.
    #[error("{message}")]
    InvalidInput {
        /// Description of what was wrong with the input.
        message: String,
    },

    /// The bearer token did not match the configured stats secret.
    #[error("Unauthorized")]
    Unauthorized,

    // === Configuration Errors ===
    /// A required setting is absent or unusable.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the missing or invalid setting.
        message: String,
    },

    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Storage Errors ===
    /// The document store could not be reached or opened.
    #[error("failed to connect to database at {path}: {source}")]
    Connection {
        /// Location of the database.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A store operation failed.
    #[error("storage operation failed: {0}")]
    Storage(#[from] rusqlite::Error),

    // === Mail Errors ===
    /// The mail provider rejected or failed to deliver a message.
    #[error("{0}")]
    MailProvider(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for portfolio operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {err}"))
    }
}

impl Error {
    /// Create a new invalid input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new mail provider error.
    #[must_use]
    pub fn mail_provider(message: impl Into<String>) -> Self {
        Self::MailProvider(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error was caused by the client's input.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }

    /// Check if this error is an authorization failure.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Check if this error came from the document store, including a store
    /// location that could not be created.
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::DirectoryCreate { .. } | Self::Storage(_)
        )
    }

    /// The HTTP status this error is reported as.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message that is safe to hand back to an HTTP caller.
    ///
    /// Store and configuration details stay in the server log.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidInput { .. } | Self::Unauthorized | Self::MailProvider(_) => {
                self.to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}
