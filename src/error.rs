//! Error types for the trustforge federation system.
//!
//! This module provides a comprehensive error hierarchy for all operations
//! in the federation lifecycle: configuration, policy compilation, the
//! Google Cloud backend, and reconciliation.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the trustforge federation system.
#[derive(Debug, Error)]
pub enum TrustForgeError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Identity backend errors.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Trust policy compilation errors.
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Identity backend errors.
///
/// These map one-to-one onto failure modes of the Google Cloud IAM APIs and
/// are surfaced to callers unchanged. Only [`BackendError::NotFound`] is
/// interpreted by the core (as "resource is absent"); every other variant
/// propagates as a failure.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Authentication failed (missing or expired access token).
    #[error("Backend authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The caller lacks permission on the target resource.
    #[error("Permission denied on {resource}: {message}")]
    PermissionDenied {
        /// Resource the call targeted.
        resource: String,
        /// Error message from the API.
        message: String,
    },

    /// The requested resource does not exist.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Resource that was requested.
        resource: String,
    },

    /// API request failed.
    #[error("API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Rate limited.
    #[error("API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error communicating with backend: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid response from backend: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Trust policy compilation errors.
///
/// The compiler rejects bad input before any synthesis; a partially built
/// condition is never emitted.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The repository field is empty.
    #[error("Trust policy repository is empty")]
    EmptyRepository,

    /// The repository is not in `owner/name` form.
    #[error("Malformed repository '{repository}': expected owner/name")]
    MalformedRepository {
        /// The offending repository token.
        repository: String,
    },

    /// A branch or tag allow-list entry is empty.
    #[error("Empty entry in {list} allow-list")]
    EmptyRefEntry {
        /// Which allow-list contained the empty entry.
        list: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reconciliation was aborted before applying changes.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },

    /// Applying changes failed for a specific resource.
    #[error("Failed to apply {resource_type} '{name}': {reason}")]
    ResourceApplyFailed {
        /// Type of resource.
        resource_type: String,
        /// Name of the resource.
        name: String,
        /// Reason for failure.
        reason: String,
    },
}

/// Result type alias for trustforge operations.
pub type Result<T> = std::result::Result<T, TrustForgeError>;

impl TrustForgeError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    ///
    /// Only the backend adapter consults this; the core never retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Backend(BackendError::RateLimited { .. } | BackendError::NetworkError { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Backend(BackendError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            Self::Backend(BackendError::NetworkError { .. }) => Some(5),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl BackendError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates a not-found error for the given resource.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }
}
