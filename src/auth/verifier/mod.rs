//! Credential verification strategies
//!
//! Every strategy turns presented credentials into a verified [`Identity`] or
//! an [`AuthError`]. The set is closed and chosen from configuration at
//! startup.

pub mod github;
pub mod ssh;
pub mod static_users;

pub use github::GitHubVerifier;
pub use ssh::SshVerifier;
pub use static_users::StaticVerifier;

use std::fmt;

use crate::error::AuthError;
use crate::models::Identity;

/// Credentials presented to a verifier
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Username and password
    Password { username: String, password: String },
    /// GitHub personal access token, absent when the caller sent none
    GitHubToken(Option<String>),
}

impl Credentials {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Password {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::GitHubToken(token) => f
                .debug_tuple("GitHubToken")
                .field(&token.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// A configured verification strategy
pub enum CredentialVerifier {
    Ssh(SshVerifier),
    GitHub(GitHubVerifier),
    Static(StaticVerifier),
}

impl CredentialVerifier {
    pub fn name(&self) -> &'static str {
        match self {
            CredentialVerifier::Ssh(_) => "ssh",
            CredentialVerifier::GitHub(_) => "github",
            CredentialVerifier::Static(_) => "static",
        }
    }

    /// Verify credentials, yielding the identity they prove
    ///
    /// Credentials of the wrong kind for the strategy are `Unauthorized`.
    pub async fn verify(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        match (self, credentials) {
            (CredentialVerifier::Ssh(v), Credentials::Password { username, password }) => {
                v.verify(username, password).await
            }
            (CredentialVerifier::Static(v), Credentials::Password { username, password }) => {
                v.verify(username, password).await
            }
            (CredentialVerifier::GitHub(v), Credentials::GitHubToken(token)) => {
                v.verify(token.as_deref()).await
            }
            _ => Err(AuthError::Unauthorized),
        }
    }
}

impl fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialVerifier").field(&self.name()).finish()
    }
}
