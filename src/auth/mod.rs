//! Authentication system for atlas-gateway
//!
//! This module provides authentication and request admission:
//! - Bearer token generation, storage and expiry
//! - Credential verification (SSH, GitHub repository permission, static table)
//! - Sliding-window request rate limiting

pub mod manager;
pub mod ratelimit;
pub mod token;
pub mod verifier;

pub use manager::AuthManager;
pub use ratelimit::{LimitScope, RateDecision, RequestRateLimiter, SlidingWindowLimiter};
pub use token::{
    generate_token, hash_password, is_valid_token_format, verify_password, HashError, TokenStore,
    TOKEN_PREFIX,
};
pub use verifier::{CredentialVerifier, Credentials};
