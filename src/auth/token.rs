//! Bearer token generation and the in-memory token store
//!
//! Tokens use the `atl_` prefix followed by 32 bytes of random data encoded in
//! URL-safe Base64. The [`TokenStore`] maps live tokens to the identity they
//! were issued to and evicts them once they expire.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::AuthError;
use crate::models::{Identity, IssuedToken};

/// Token prefix for atlas-gateway tokens
pub const TOKEN_PREFIX: &str = "atl_";

/// Length of the random part of the token in bytes
const TOKEN_RANDOM_BYTES: usize = 32;

/// Upper bound on token lifetime (ten years)
const MAX_TTL_SECS: u64 = 10 * 366 * 24 * 3600;

/// Generate a new raw bearer token
///
/// The token format is: `atl_` + Base64-encoded 32 random bytes
///
/// # Example
///
/// ```
/// use atlas_gateway::auth::token::generate_token;
///
/// let token = generate_token();
/// assert!(token.starts_with("atl_"));
/// ```
pub fn generate_token() -> String {
    use rand::RngCore;

    let mut random_bytes = [0u8; TOKEN_RANDOM_BYTES];
    OsRng.fill_bytes(&mut random_bytes);
    format!("{}{}", TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(random_bytes))
}

/// Check if a token has the correct format
///
/// Valid tokens start with `atl_` and have a base64-encoded body.
pub fn is_valid_token_format(token: &str) -> bool {
    match token.strip_prefix(TOKEN_PREFIX) {
        Some(body) if !body.is_empty() => URL_SAFE_NO_PAD.decode(body).is_ok(),
        _ => false,
    }
}

/// Hash a password using Argon2id
///
/// Produces the PHC strings listed under `auth.static_users`.
///
/// ```
/// use atlas_gateway::auth::token::{hash_password, verify_password};
///
/// let hash = hash_password("correct horse").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// assert!(verify_password("correct horse", &hash));
/// ```
pub fn hash_password(password: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError::HashFailed(e.to_string()))
}

/// Verify a password against a stored Argon2 hash
///
/// Returns `false` for a malformed hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Error type for password hashing operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HashError {
    /// Hashing failed
    #[error("Hash failed: {0}")]
    HashFailed(String),
}

/// Thread-safe store of live bearer tokens
///
/// Every operation holds the lock only for a single map access; nothing
/// awaits while holding it.
pub struct TokenStore {
    ttl: Duration,
    tokens: Mutex<HashMap<String, IssuedToken>>,
}

impl TokenStore {
    /// Create a store issuing tokens valid for `ttl_secs`
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<String, IssuedToken>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Issue a new token for `identity`
    pub fn issue(&self, identity: Identity) -> IssuedToken {
        self.issue_at(identity, Utc::now())
    }

    /// Issue a new token as of `now`
    pub fn issue_at(&self, identity: Identity, now: DateTime<Utc>) -> IssuedToken {
        let issued = IssuedToken {
            token: generate_token(),
            identity,
            issued_at: now,
            expires_at: now + self.ttl,
        };

        self.tokens().insert(issued.token.clone(), issued.clone());
        issued
    }

    /// Resolve a bearer token to its identity
    pub fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        self.validate_at(token, Utc::now())
    }

    /// Resolve a bearer token as of `now`
    ///
    /// Expired tokens are evicted here and reported as unknown.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, AuthError> {
        if !is_valid_token_format(token) {
            return Err(AuthError::Unauthorized);
        }

        let mut tokens = self.tokens();
        match tokens.get(token) {
            Some(entry) if entry.is_valid_at(now) => Ok(entry.identity.clone()),
            Some(entry) if now >= entry.expires_at => {
                tokens.remove(token);
                Err(AuthError::Unauthorized)
            }
            _ => Err(AuthError::Unauthorized),
        }
    }

    /// Revoke a token; returns whether it was live
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens().remove(token).is_some()
    }

    /// Drop every token expired as of `now`, returning how many were removed
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut tokens = self.tokens();
        let before = tokens.len();
        tokens.retain(|_, entry| now < entry.expires_at);
        before - tokens.len()
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    /// Number of tokens currently held, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.tokens().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // Test 1: generate_token creates token with atl_ prefix and 32 random bytes
    #[test]
    fn test_generate_token_format() {
        let token = generate_token();
        assert!(token.starts_with(TOKEN_PREFIX));

        let decoded = URL_SAFE_NO_PAD.decode(&token[TOKEN_PREFIX.len()..]).unwrap();
        assert_eq!(decoded.len(), TOKEN_RANDOM_BYTES);
    }

    // Test 2: generate_token creates unique tokens
    #[test]
    fn test_generate_token_is_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    // Test 3: is_valid_token_format
    #[test]
    fn test_is_valid_token_format() {
        assert!(is_valid_token_format(&generate_token()));
        assert!(!is_valid_token_format("abc123"));
        assert!(!is_valid_token_format("atl_"));
        assert!(!is_valid_token_format("atl_!!!invalid!!!"));
        assert!(!is_valid_token_format("anonymous"));
    }

    // Test 4: password hashing round trip
    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret", "not_a_valid_hash"));
    }

    // Test 5: token valid for [issued_at, issued_at + ttl)
    #[test]
    fn test_validate_within_ttl_window() {
        let store = TokenStore::new(60);
        let now = Utc::now();
        let issued = store.issue_at(Identity::new("alice"), now);

        assert_eq!(issued.expires_at - issued.issued_at, Duration::seconds(60));
        assert_eq!(
            store.validate_at(&issued.token, now).unwrap(),
            Identity::new("alice")
        );
        assert!(store
            .validate_at(&issued.token, now + Duration::seconds(59))
            .is_ok());
        assert_eq!(
            store.validate_at(&issued.token, now + Duration::seconds(60)),
            Err(AuthError::Unauthorized)
        );
    }

    // Test 6: expired tokens are evicted on lookup
    #[test]
    fn test_expired_token_is_evicted() {
        let store = TokenStore::new(10);
        let now = Utc::now();
        let issued = store.issue_at(Identity::new("alice"), now);
        assert_eq!(store.len(), 1);

        let _ = store.validate_at(&issued.token, now + Duration::seconds(11));
        assert_eq!(store.len(), 0);

        // Once evicted it stays rejected even at an earlier clock reading
        assert!(store.validate_at(&issued.token, now).is_err());
    }

    // Test 7: unknown and malformed tokens are rejected
    #[test]
    fn test_unknown_token_rejected() {
        let store = TokenStore::new(60);
        assert_eq!(
            store.validate(&generate_token()),
            Err(AuthError::Unauthorized)
        );
        assert_eq!(store.validate(""), Err(AuthError::Unauthorized));
    }

    // Test 8: revoke
    #[test]
    fn test_revoke() {
        let store = TokenStore::new(60);
        let issued = store.issue(Identity::new("bob"));

        assert!(store.revoke(&issued.token));
        assert!(!store.revoke(&issued.token));
        assert!(store.validate(&issued.token).is_err());
    }

    // Test 9: purge_expired removes only expired tokens
    #[test]
    fn test_purge_expired() {
        let store = TokenStore::new(30);
        let now = Utc::now();
        store.issue_at(Identity::new("old"), now - Duration::seconds(60));
        let fresh = store.issue_at(Identity::new("new"), now);

        assert_eq!(store.purge_expired_at(now), 1);
        assert_eq!(store.len(), 1);
        assert!(store.validate_at(&fresh.token, now).is_ok());
    }

    // Test 10: concurrent issue and validate from many threads
    #[test]
    fn test_concurrent_issue_and_validate() {
        let store = Arc::new(TokenStore::new(60));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| {
                            let issued = store.issue(Identity::new(format!("user{}", i)));
                            store.validate(&issued.token).unwrap()
                        })
                        .filter(|id| id.as_str() == format!("user{}", i))
                        .count()
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 400);
        assert_eq!(store.len(), 400);
    }

    // Test 11: a lookup dated before issuance is refused but keeps the token
    #[test]
    fn test_validate_before_issuance() {
        let store = TokenStore::new(60);
        let now = Utc::now();
        let issued = store.issue_at(Identity::new("alice"), now);

        assert_eq!(
            store.validate_at(&issued.token, now - Duration::seconds(1)),
            Err(AuthError::Unauthorized)
        );
        assert_eq!(store.len(), 1);
        assert!(store.validate_at(&issued.token, now).is_ok());
    }
}
