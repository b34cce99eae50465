//! Domain models for atlas-gateway
//!
//! This module contains the request, response and record types shared by the
//! gateway, the atlas and the access-request service.

pub mod access;
pub mod tile;
pub mod token;

// Re-export commonly used types
pub use access::{AccessReceipt, AccessRequest, AccessRequestRecord, NotificationOutcome};
pub use tile::{BoundingBox, TileDescriptor, TileQuery, TileQueryResponse, TileRecord};
pub use token::{
    GitHubAuthRequest, GitHubAuthResponse, Identity, IssuedToken, TokenRequest, TokenResponse,
};
