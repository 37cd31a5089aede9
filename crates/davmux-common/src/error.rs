//! Error types for davmux
//!
//! This module defines the common error types used throughout the system.

use thiserror::Error;

/// Common result type for davmux operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for davmux
#[derive(Debug, Error)]
pub enum Error {
    // Virtual tree errors
    #[error("{0}: file does not exist")]
    NotExist(String),

    #[error("permission denied")]
    PermissionDenied,

    // Backend errors
    #[error("invalid backend url {url}: {reason}")]
    InvalidBackendUrl { url: String, reason: String },

    #[error("backend error: {0}")]
    Backend(String),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not-exist error for the given path
    pub fn not_exist(path: impl Into<String>) -> Self {
        Self::NotExist(path.into())
    }

    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not-exist error
    #[must_use]
    pub const fn is_not_exist(&self) -> bool {
        matches!(self, Self::NotExist(_))
    }

    /// Check if this is a permission error
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }

    /// Get the HTTP status code clients see for this error
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 403 Forbidden
            Self::PermissionDenied => 403,

            // 404 Not Found
            Self::NotExist(_) => 404,

            // 500 Internal Server Error
            Self::InvalidBackendUrl { .. } | Self::Configuration(_) | Self::Internal(_) => 500,

            // 502 Bad Gateway
            Self::Backend(_) => 502,
        }
    }
}
