//! Token verification by GitHub repository permission
//!
//! A GitHub token is accepted when its owner holds at least write access on
//! the configured repository. Refusals carry a reason the caller may see.

use tracing::debug;

use crate::error::{AuthError, UpstreamError};
use crate::github::{GitHubClient, Permission};
use crate::models::Identity;

/// Minimum permission accepted
pub const REQUIRED_PERMISSION: Permission = Permission::Write;

#[derive(Debug, Clone)]
pub struct GitHubVerifier {
    client: GitHubClient,
}

impl GitHubVerifier {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    pub async fn verify(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthError::Denied("missing token".to_string())),
        };

        let user = self
            .client
            .authenticated_user(token)
            .await
            .map_err(|e| check_failed("user", e))?;

        let permissions = self
            .client
            .repo_permissions(token)
            .await
            .map_err(|e| check_failed("repo", e))?;

        let level = permissions.level();
        if level < REQUIRED_PERMISSION {
            debug!(
                login = ?user.login,
                repo = self.client.repo(),
                permission = ?level,
                "GitHub permission below write"
            );
            return Err(AuthError::Denied("insufficient permission".to_string()));
        }

        Ok(user.identity())
    }
}

/// Status failures are reportable; transport failures are not
fn check_failed(stage: &str, error: UpstreamError) -> AuthError {
    match error {
        UpstreamError::Status(code) => AuthError::Denied(format!("{} check http {}", stage, code)),
        UpstreamError::Timeout => AuthError::AuthTimeout,
        other => AuthError::Upstream(other.to_string()),
    }
}
