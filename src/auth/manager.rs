//! Authentication manager
//!
//! This module provides the main authentication interface for the gateway.
//! It runs credential verifiers under a time bound, issues and validates
//! bearer tokens, and handles the unauthenticated mode.

use std::time::Duration;
use tracing::{debug, info};

use crate::config::{Config, PasswordBackend};
use crate::error::{AuthError, UpstreamError};
use crate::github::GitHubClient;
use crate::models::{GitHubAuthResponse, Identity, TokenResponse};

use super::token::TokenStore;
use super::verifier::{
    CredentialVerifier, Credentials, GitHubVerifier, SshVerifier, StaticVerifier,
};

/// Authentication manager
///
/// Owns the token store and the configured verifiers.
pub struct AuthManager {
    enabled: bool,
    tokens: TokenStore,
    password_verifier: CredentialVerifier,
    github_verifier: Option<CredentialVerifier>,
    verify_timeout: Duration,
}

impl AuthManager {
    /// Create a new authentication manager
    pub fn new(
        enabled: bool,
        tokens: TokenStore,
        password_verifier: CredentialVerifier,
        github_verifier: Option<CredentialVerifier>,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            enabled,
            tokens,
            password_verifier,
            github_verifier,
            verify_timeout,
        }
    }

    /// Build the manager and its verifiers from configuration
    pub fn from_config(config: &Config) -> Result<Self, UpstreamError> {
        let password_verifier = match config.auth.password_backend {
            PasswordBackend::Ssh => CredentialVerifier::Ssh(SshVerifier::new(&config.auth.ssh)),
            PasswordBackend::Static => {
                CredentialVerifier::Static(StaticVerifier::new(config.auth.static_users.clone()))
            }
        };

        let github_verifier = if config.github.enabled {
            let client = GitHubClient::new(&config.github)?;
            Some(CredentialVerifier::GitHub(GitHubVerifier::new(client)))
        } else {
            None
        };

        info!(
            enabled = config.auth.enabled,
            password_backend = password_verifier.name(),
            github = github_verifier.is_some(),
            token_ttl_secs = config.auth.token_ttl_secs,
            "Authentication configured"
        );

        Ok(Self::new(
            config.auth.enabled,
            TokenStore::new(config.auth.token_ttl_secs),
            password_verifier,
            github_verifier,
            Duration::from_secs(config.auth.verify_timeout_secs),
        ))
    }

    /// Check if authentication is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn github_enabled(&self) -> bool {
        self.github_verifier.is_some()
    }

    /// Name of the verifier behind the password exchange
    pub fn password_backend(&self) -> &'static str {
        self.password_verifier.name()
    }

    async fn verify(
        &self,
        verifier: &CredentialVerifier,
        credentials: &Credentials,
    ) -> Result<Identity, AuthError> {
        match tokio::time::timeout(self.verify_timeout, verifier.verify(credentials)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(verifier = verifier.name(), "Credential verification timed out");
                Err(AuthError::AuthTimeout)
            }
        }
    }

    /// Exchange a username and password for a bearer token
    ///
    /// With authentication disabled the constant `anonymous` token is returned
    /// without consulting any verifier.
    pub async fn exchange_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, AuthError> {
        if !self.enabled {
            return Ok(TokenResponse::anonymous());
        }

        let credentials = Credentials::password(username, password);
        let identity = self.verify(&self.password_verifier, &credentials).await?;
        let issued = self.tokens.issue(identity);
        info!(user = %issued.identity, "Token issued");

        Ok(TokenResponse::from_issued(&issued))
    }

    /// Check a GitHub token's repository permission, optionally issuing a token
    ///
    /// Refusals are returned as `authenticated: false` responses; only
    /// timeouts and transport failures are errors.
    pub async fn authenticate_github(
        &self,
        token: Option<String>,
        issue_token: bool,
    ) -> Result<GitHubAuthResponse, AuthError> {
        let verifier = self
            .github_verifier
            .as_ref()
            .ok_or_else(|| AuthError::NotConfigured("github".to_string()))?;

        match self.verify(verifier, &Credentials::GitHubToken(token)).await {
            Ok(identity) if issue_token => {
                let issued = self.tokens.issue(identity.clone());
                info!(user = %identity, "Token issued via GitHub");
                Ok(GitHubAuthResponse::with_token(&identity, &issued))
            }
            Ok(identity) => Ok(GitHubAuthResponse::authenticated(&identity)),
            Err(AuthError::Denied(reason)) => Ok(GitHubAuthResponse::denied(reason)),
            Err(e) => Err(e),
        }
    }

    /// Validate a bearer token
    ///
    /// Every token resolves to `anonymous` when authentication is disabled.
    pub fn validate_token(&self, token: &str) -> Result<Identity, AuthError> {
        if !self.enabled {
            return Ok(Identity::anonymous());
        }
        self.tokens.validate(token)
    }

    /// Revoke a bearer token; returns whether it was live
    pub fn revoke_token(&self, token: &str) -> bool {
        self.tokens.revoke(token)
    }

    /// Drop expired tokens
    pub fn purge_expired(&self) -> usize {
        self.tokens.purge_expired()
    }
}
