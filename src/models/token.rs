//! Token-related domain models
//!
//! This module defines verified identities, issued bearer tokens, and the
//! request/response bodies of the authentication routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Verified principal attached to tokens and access requests
///
/// An SSH username or a GitHub login; the gateway never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create a new identity
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Identity used when authentication is disabled
    pub fn anonymous() -> Self {
        Self("anonymous".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bearer token as handed to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Raw token value
    pub token: String,

    /// Identity the token was issued to
    pub identity: Identity,

    /// When the token was issued
    pub issued_at: DateTime<Utc>,

    /// First instant at which the token is no longer accepted
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    /// Whether the token is accepted at `now` (`issued_at <= now < expires_at`)
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.issued_at && now < self.expires_at
    }

    /// Whole seconds of validity remaining at `now`, floored at zero
    pub fn expires_in(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// Body of `POST /auth/token`
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Response of `POST /auth/token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Raw token value
    pub token: String,

    /// Seconds until expiry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Expiry as Unix seconds
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenResponse {
    /// Response for the constant token handed out when auth is disabled
    pub fn anonymous() -> Self {
        Self {
            token: Identity::anonymous().to_string(),
            expires_in: None,
            expires_at: None,
        }
    }

    /// Response describing a freshly issued token
    pub fn from_issued(issued: &IssuedToken) -> Self {
        Self {
            token: issued.token.clone(),
            expires_in: Some(issued.expires_in(issued.issued_at)),
            expires_at: Some(issued.expires_at),
        }
    }
}

/// Body of `POST /auth/github`
#[derive(Clone, PartialEq, Eq, Default, Deserialize)]
pub struct GitHubAuthRequest {
    /// Personal access token; may instead arrive in the Authorization header
    #[serde(default)]
    pub token: Option<String>,

    /// Issue a gateway bearer token on success
    #[serde(default)]
    pub issue_token: bool,
}

impl fmt::Debug for GitHubAuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubAuthRequest")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("issue_token", &self.issue_token)
            .finish()
    }
}

/// Response of `POST /auth/github`
///
/// Refusals are ordinary responses with `authenticated: false` and a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubAuthResponse {
    pub authenticated: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Expiry as Unix seconds
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl GitHubAuthResponse {
    /// Successful check without token issuance
    pub fn authenticated(identity: &Identity) -> Self {
        Self {
            authenticated: true,
            user: Some(identity.to_string()),
            token: None,
            expires_in: None,
            expires_at: None,
            reason: None,
        }
    }

    /// Successful check with a gateway token attached
    pub fn with_token(identity: &Identity, issued: &IssuedToken) -> Self {
        Self {
            token: Some(issued.token.clone()),
            expires_in: Some(issued.expires_in(issued.issued_at)),
            expires_at: Some(issued.expires_at),
            ..Self::authenticated(identity)
        }
    }

    /// Refusal carrying a reportable reason
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            user: None,
            token: None,
            expires_in: None,
            expires_at: None,
            reason: Some(reason.into()),
        }
    }
}
