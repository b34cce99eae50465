//! Password verification against a configured table of Argon2 hashes

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::auth::token::verify_password;
use crate::error::AuthError;
use crate::models::Identity;

/// Verifies usernames and passwords against `auth.static_users`
#[derive(Debug, Clone)]
pub struct StaticVerifier {
    users: Arc<BTreeMap<String, String>>,
}

impl StaticVerifier {
    /// Create a verifier from username to PHC hash string
    pub fn new(users: BTreeMap<String, String>) -> Self {
        Self {
            users: Arc::new(users),
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub async fn verify(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let Some(hash) = self.users.get(username).cloned() else {
            debug!(username = username, "Unknown static user");
            return Err(AuthError::Unauthorized);
        };

        // Argon2 verification is CPU-bound
        let password = password.to_string();
        let matched = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))?;

        if matched {
            Ok(Identity::new(username))
        } else {
            Err(AuthError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::hash_password;

    fn verifier() -> StaticVerifier {
        let mut users = BTreeMap::new();
        users.insert("alice".to_string(), hash_password("wonderland").unwrap());
        users.insert("broken".to_string(), "not-a-hash".to_string());
        StaticVerifier::new(users)
    }

    #[tokio::test]
    async fn test_correct_password() {
        let identity = verifier().verify("alice", "wonderland").await.unwrap();
        assert_eq!(identity, Identity::new("alice"));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        assert_eq!(
            verifier().verify("alice", "looking-glass").await,
            Err(AuthError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn test_unknown_user() {
        assert_eq!(
            verifier().verify("mallory", "wonderland").await,
            Err(AuthError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn test_malformed_hash_rejects() {
        assert_eq!(
            verifier().verify("broken", "anything").await,
            Err(AuthError::Unauthorized)
        );
        assert_eq!(verifier().user_count(), 2);
    }
}
