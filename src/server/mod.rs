//! HTTP server components for atlas-gateway
//!
//! This module provides the HTTP server infrastructure including:
//! - Router configuration and route handlers
//! - Rate-limit, bearer-token and logging middleware
//! - Error-to-status mapping at the HTTP boundary
//! - Server lifecycle management

pub mod files;
pub mod middleware;
pub mod router;

pub use middleware::AuthenticatedIdentity;
pub use router::{build_router, AppState, HealthResponse};

use std::future::Future;
use std::net::SocketAddr;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tokio::net::TcpListener;
use tracing::{error, warn};

use crate::config::ServerConfig;
use crate::error::{AccessError, AtlasError, AuthError, FileError};

/// HTTP Server for atlas-gateway
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.config.host.parse().unwrap_or([0, 0, 0, 0].into()),
            self.config.port,
        )
    }

    /// Run the server until `shutdown` resolves
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.bind_addr();
        let app = build_router(self.state).layer(tower_http::trace::TraceLayer::new_for_http());

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// Failed to serve requests
    #[error("Server error: {0}")]
    Serve(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error returned by route handlers and middleware
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Atlas(AtlasError),
    Access(AccessError),
    File(FileError),
    /// Refused by the request rate limiter
    RateLimited { retry_after_secs: u64 },
    NotFound(String),
    BadRequest(String),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl From<AtlasError> for ApiError {
    fn from(e: AtlasError) -> Self {
        ApiError::Atlas(e)
    }
}

impl From<AccessError> for ApiError {
    fn from(e: AccessError) -> Self {
        ApiError::Access(e)
    }
}

impl From<FileError> for ApiError {
    fn from(e: FileError) -> Self {
        ApiError::File(e)
    }
}

const INTERNAL_ERROR: &str = "Internal server error";

impl ApiError {
    /// Status code and client-facing message
    ///
    /// Internal failures get a generic message; their detail is only logged.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Auth(e) => match e {
                AuthError::Unauthorized | AuthError::MissingAuth | AuthError::Denied(_) => {
                    (StatusCode::UNAUTHORIZED, e.to_string())
                }
                AuthError::AuthTimeout | AuthError::Upstream(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Authentication backend unavailable, retry later".to_string(),
                ),
                AuthError::NotConfigured(_) => (StatusCode::NOT_FOUND, e.to_string()),
            },
            ApiError::Atlas(e) => match e {
                AtlasError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                AtlasError::UnknownDataset(_) => (StatusCode::NOT_FOUND, e.to_string()),
                AtlasError::Io { .. }
                | AtlasError::Malformed(_)
                | AtlasError::InvalidBoundingBox(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Atlas unavailable".to_string(),
                ),
            },
            ApiError::Access(e) => match e {
                AccessError::BodyTooLarge => (StatusCode::BAD_REQUEST, e.to_string()),
                AccessError::Invalid(message) => (StatusCode::BAD_REQUEST, message.clone()),
                AccessError::UnknownIdentity(_) => (
                    StatusCode::BAD_REQUEST,
                    "GitHub user not found".to_string(),
                ),
                AccessError::DuplicateRequest(_) => (
                    StatusCode::CONFLICT,
                    "An access request for this GitHub user already exists".to_string(),
                ),
                AccessError::RateLimited(_) => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Too many requests".to_string(),
                ),
                AccessError::LookupUnavailable(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "GitHub lookup unavailable, retry later".to_string(),
                ),
                AccessError::Storage(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_string())
                }
            },
            ApiError::File(e) => match e {
                FileError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
                FileError::NotFound => (StatusCode::NOT_FOUND, "File not found".to_string()),
                FileError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_string()),
            },
            ApiError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests".to_string(),
            ),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status_and_message().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = ?self, "Request failed");
        } else if matches!(self, ApiError::File(FileError::Forbidden)) {
            warn!("Rejected file path outside dataset root");
        }

        let body = Json(serde_json::json!({ "error": message }));
        match self {
            ApiError::RateLimited { retry_after_secs } => (
                status,
                [(header::RETRY_AFTER, retry_after_secs.max(1).to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}
