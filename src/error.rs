//! Application error types for atlas-gateway
//!
//! This module defines the error types shared across the gateway.
//! All error types use `thiserror` for ergonomic error handling; the HTTP
//! mapping lives in [`crate::server::ApiError`].

use thiserror::Error;

/// Authentication-related errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// Missing, unknown, expired or revoked bearer token, or failed credential check
    #[error("Unauthorized")]
    Unauthorized,

    /// Missing authorization header
    #[error("Missing authorization header")]
    MissingAuth,

    /// Credentials were checked and refused for a reportable reason
    ///
    /// Only the GitHub verifier produces this; the reason is returned to the
    /// caller as a normal response body.
    #[error("Not authenticated: {0}")]
    Denied(String),

    /// External verifier did not answer within the configured bound
    #[error("Authentication backend timed out")]
    AuthTimeout,

    /// External verifier could not be reached
    #[error("Authentication backend unavailable: {0}")]
    Upstream(String),

    /// Verification backend is not configured
    #[error("Authentication backend not configured: {0}")]
    NotConfigured(String),
}

/// Atlas loading and lookup errors
#[derive(Debug, Error)]
pub enum AtlasError {
    /// Catalog file missing or unreadable
    #[error("Atlas catalog unreadable: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Catalog is not valid JSON of the expected shape
    #[error("Atlas catalog malformed: {0}")]
    Malformed(String),

    /// A record carries an inverted or non-finite bounding box
    #[error("Invalid bounding box for tile {0}")]
    InvalidBoundingBox(String),

    /// Query box is inverted, non-finite, or has a negative buffer
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Dataset is not configured
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),
}

/// Access-request submission errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccessError {
    /// Request body larger than the configured maximum
    #[error("Request too large")]
    BodyTooLarge,

    /// Body failed to parse or a field failed validation
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// Claimed identity does not exist in the external directory
    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    /// A request for this identity already exists
    #[error("Duplicate access request for {0}")]
    DuplicateRequest(String),

    /// Submission quota exceeded
    #[error("Too many requests ({0})")]
    RateLimited(&'static str),

    /// External lookup timed out or failed
    #[error("Identity lookup unavailable: {0}")]
    LookupUnavailable(String),

    /// Failed to persist the record
    #[error("Failed to persist request: {0}")]
    Storage(String),
}

/// File resolution errors
#[derive(Debug, Error)]
pub enum FileError {
    /// Requested name escapes the dataset root
    #[error("Path escapes dataset root")]
    Forbidden,

    /// File does not exist
    #[error("File not found")]
    NotFound,

    /// IO error while resolving or opening the file
    #[error("File IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// External API errors (GitHub)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpstreamError {
    /// Request timed out
    #[error("Network timeout")]
    Timeout,

    /// Connection could not be established
    #[error("Connection refused")]
    ConnectionRefused,

    /// Unexpected status code
    #[error("Unexpected status: HTTP {0}")]
    Status(u16),

    /// Response body did not decode
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Generic network error
    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if e.is_connect() {
            UpstreamError::ConnectionRefused
        } else if e.is_decode() {
            UpstreamError::InvalidData(e.to_string())
        } else {
            UpstreamError::Network(e.to_string())
        }
    }
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the caller may retry the same request later
    fn is_retryable(&self) -> bool;
}

impl RetryableError for AuthError {
    fn is_retryable(&self) -> bool {
        matches!(self, AuthError::AuthTimeout | AuthError::Upstream(_))
    }
}

impl RetryableError for UpstreamError {
    fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Timeout => true,
            UpstreamError::ConnectionRefused => true,
            UpstreamError::Network(_) => true,
            UpstreamError::Status(code) => *code >= 500 || *code == 429,
            UpstreamError::InvalidData(_) => false,
        }
    }
}

impl RetryableError for AccessError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            AccessError::RateLimited(_) | AccessError::LookupUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_messages() {
        assert_eq!(AuthError::Unauthorized.to_string(), "Unauthorized");
        assert_eq!(
            AuthError::MissingAuth.to_string(),
            "Missing authorization header"
        );
        assert_eq!(
            AuthError::Denied("insufficient permission".to_string()).to_string(),
            "Not authenticated: insufficient permission"
        );
        assert_eq!(
            AuthError::AuthTimeout.to_string(),
            "Authentication backend timed out"
        );
    }

    #[test]
    fn test_access_error_messages() {
        assert_eq!(AccessError::BodyTooLarge.to_string(), "Request too large");
        assert_eq!(
            AccessError::DuplicateRequest("octocat".to_string()).to_string(),
            "Duplicate access request for octocat"
        );
        assert_eq!(
            AccessError::RateLimited("ip interval").to_string(),
            "Too many requests (ip interval)"
        );
    }

    #[test]
    fn test_atlas_error_io_message_includes_path() {
        let err = AtlasError::Io {
            path: "/data/atlas.json".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.to_string().contains("/data/atlas.json"));
    }

    #[test]
    fn test_file_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: FileError = io_err.into();
        assert!(matches!(err, FileError::Io(_)));
    }

    #[test]
    fn test_auth_error_retryable() {
        assert!(AuthError::AuthTimeout.is_retryable());
        assert!(AuthError::Upstream("reset".to_string()).is_retryable());
        assert!(!AuthError::Unauthorized.is_retryable());
        assert!(!AuthError::Denied("insufficient permission".to_string()).is_retryable());
    }

    #[test]
    fn test_upstream_error_retryable() {
        assert!(UpstreamError::Timeout.is_retryable());
        assert!(UpstreamError::ConnectionRefused.is_retryable());
        assert!(UpstreamError::Status(503).is_retryable());
        assert!(UpstreamError::Status(429).is_retryable());
        assert!(!UpstreamError::Status(404).is_retryable());
        assert!(!UpstreamError::InvalidData("bad json".to_string()).is_retryable());
    }

    #[test]
    fn test_access_error_retryable() {
        assert!(AccessError::RateLimited("email window").is_retryable());
        assert!(!AccessError::DuplicateRequest("x".to_string()).is_retryable());
        assert!(!AccessError::UnknownIdentity("x".to_string()).is_retryable());
    }

    #[test]
    fn test_auth_error_clone_and_eq() {
        let err1 = AuthError::Denied("repo check http 404".to_string());
        let err2 = err1.clone();
        assert_eq!(err1, err2);
        assert_ne!(err1, AuthError::Unauthorized);
    }
}
