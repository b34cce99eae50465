//! HTTP router for atlas-gateway
//!
//! This module defines the axum router that handles all HTTP requests.
//! It provides routes for:
//! - Health check and banner
//! - Token issuance, revocation and GitHub authentication
//! - Tile queries and tile downloads per dataset, with legacy aliases
//! - Access-request submission

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection},
        ConnectInfo, DefaultBodyLimit, Path, State,
    },
    http::{header, HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::Arc;
use tracing::{info, warn};

use crate::access::{AccessLog, AccessRequestService};
use crate::atlas::AtlasIndex;
use crate::auth::{AuthManager, RequestRateLimiter};
use crate::config::Config;
use crate::error::{AccessError, AtlasError, AuthError};
use crate::github::GitHubClient;
use crate::models::{
    AccessReceipt, GitHubAuthRequest, GitHubAuthResponse, TileQuery, TileQueryResponse,
    TokenRequest, TokenResponse,
};
use crate::otel::GatewayMetrics;

use super::files;
use super::middleware::{
    auth_middleware, bearer_token, client_addr, logging_middleware, rate_limit_middleware,
};
use super::{ApiError, ServerError};

/// Used when the configured requests directory cannot be created
const FALLBACK_REQUESTS_DIR: &str = "access_requests";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub atlas: Arc<AtlasIndex>,
    pub auth: Arc<AuthManager>,
    pub limiter: Arc<RequestRateLimiter>,
    pub access: Arc<AccessRequestService>,
    pub metrics: Arc<GatewayMetrics>,
}

impl AppState {
    /// Assemble every component from configuration
    pub fn from_config(config: Config, metrics: GatewayMetrics) -> Result<Self, ServerError> {
        let auth = AuthManager::from_config(&config)
            .map_err(|e| ServerError::Config(format!("Authentication: {}", e)))?;

        let github = GitHubClient::new(&config.github)
            .map_err(|e| ServerError::Config(format!("GitHub client: {}", e)))?
            .with_issue_tracking(config.access.github_token.clone(), config.access.labels.clone());
        let github = Arc::new(github);

        let log = match AccessLog::open(&config.access.requests_dir) {
            Ok(log) => log,
            Err(e) => {
                warn!(
                    dir = %config.access.requests_dir.display(),
                    fallback = FALLBACK_REQUESTS_DIR,
                    error = %e,
                    "Cannot use access requests directory, falling back"
                );
                AccessLog::open(FsPath::new(FALLBACK_REQUESTS_DIR))
                    .map_err(|e| ServerError::Config(e.to_string()))?
            }
        };
        let access = AccessRequestService::new(&config.access, log, github.clone(), github);

        Ok(Self {
            atlas: Arc::new(AtlasIndex::new(&config.datasets)),
            auth: Arc::new(auth),
            limiter: Arc::new(RequestRateLimiter::from_config(&config.rate_limit)),
            access: Arc::new(access),
            metrics: Arc::new(metrics),
            config: Arc::new(config),
        })
    }

    /// Drop expired tokens, rate counters and submission quotas
    pub fn sweep(&self) {
        let purged = self.auth.purge_expired();
        self.limiter.cleanup();
        self.access.cleanup();
        if purged > 0 {
            tracing::debug!(purged, "Expired tokens purged");
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Build the application router
///
/// Every route except `/healthz` is rate limited; tile and file routes also
/// require a bearer token, checked after the rate limit.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/:dataset/tiles", post(dataset_tiles_handler))
        .route("/files/:dataset/:filename", get(dataset_file_handler))
        // Legacy aliases
        .route("/get_lidar", post(lidar_tiles_alias))
        .route("/tiles", post(gpkg_tiles_alias))
        .route("/get/lidar/:filename", get(lidar_file_alias))
        .route("/get/gpkg/:filename", get(gpkg_file_alias))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let public = Router::new()
        .route("/", get(root_handler))
        .route("/healthz", get(health_handler))
        .route(
            "/auth/token",
            post(issue_token_handler).delete(revoke_token_handler),
        )
        .route("/auth/github", post(github_auth_handler))
        .route(
            "/access/request",
            post(access_request_handler)
                .layer(DefaultBodyLimit::max(state.access.max_body_bytes())),
        );

    Router::new()
        .merge(protected)
        .merge(public)
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .route_layer(from_fn_with_state(state.clone(), logging_middleware))
        .with_state(state)
}

// =============================================================================
// Health and banner
// =============================================================================

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Atlas Gateway: LiDAR and GeoPackage tiles"
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Authentication
// =============================================================================

async fn issue_token_handler(
    State(state): State<AppState>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let backend = state.auth.password_backend();

    match state
        .auth
        .exchange_password(&request.username, &request.password)
        .await
    {
        Ok(response) => {
            if state.auth.is_enabled() {
                state.metrics.record_token_issued(backend);
            }
            Ok(Json(response))
        }
        Err(e) => {
            if e == AuthError::Unauthorized {
                state.metrics.record_credentials_rejected(backend);
            }
            Err(e.into())
        }
    }
}

async fn revoke_token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = bearer_token(&headers)?;
    if !state.auth.revoke_token(token) {
        return Err(AuthError::Unauthorized.into());
    }
    info!("Token revoked");
    Ok(Json(serde_json::json!({ "revoked": true })))
}

/// Token from the body, or from `Authorization: Bearer|token <value>`
fn github_token(body: &GitHubAuthRequest, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = body.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("token "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

async fn github_auth_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<GitHubAuthResponse>, ApiError> {
    let request: GitHubAuthRequest = if body.iter().all(u8::is_ascii_whitespace) {
        GitHubAuthRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|_| ApiError::BadRequest("Malformed request body".to_string()))?
    };
    let token = github_token(&request, &headers);

    let response = state
        .auth
        .authenticate_github(token, request.issue_token)
        .await?;

    if !response.authenticated {
        state.metrics.record_credentials_rejected("github");
    } else if response.token.is_some() {
        state.metrics.record_token_issued("github");
    }
    Ok(Json(response))
}

// =============================================================================
// Tiles
// =============================================================================

async fn query_tiles(
    state: &AppState,
    dataset: &str,
    payload: Result<Json<TileQuery>, JsonRejection>,
) -> Result<Json<TileQueryResponse>, ApiError> {
    let Json(query) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let records = state
        .atlas
        .query(dataset, &query.bbox(), query.buffer)
        .await?;
    state.metrics.record_tiles_matched(dataset, records.len());

    if records.is_empty() {
        return Err(ApiError::NotFound("No tiles found".to_string()));
    }
    Ok(Json(TileQueryResponse::from_records(&records)))
}

async fn dataset_tiles_handler(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    payload: Result<Json<TileQuery>, JsonRejection>,
) -> Result<Json<TileQueryResponse>, ApiError> {
    query_tiles(&state, &dataset, payload).await
}

async fn lidar_tiles_alias(
    State(state): State<AppState>,
    payload: Result<Json<TileQuery>, JsonRejection>,
) -> Result<Json<TileQueryResponse>, ApiError> {
    query_tiles(&state, "lidar", payload).await
}

async fn gpkg_tiles_alias(
    State(state): State<AppState>,
    payload: Result<Json<TileQuery>, JsonRejection>,
) -> Result<Json<TileQueryResponse>, ApiError> {
    query_tiles(&state, "gpkg", payload).await
}

// =============================================================================
// Files
// =============================================================================

async fn download(state: &AppState, dataset: &str, filename: &str) -> Result<Response, ApiError> {
    let config = state
        .atlas
        .dataset(dataset)
        .ok_or_else(|| AtlasError::UnknownDataset(dataset.to_string()))?;

    let response = files::stream_file(&config.data_dir, filename).await?;
    info!(dataset = %dataset, filename = %filename, "Serving tile file");
    Ok(response)
}

async fn dataset_file_handler(
    State(state): State<AppState>,
    Path((dataset, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    download(&state, &dataset, &filename).await
}

async fn lidar_file_alias(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    download(&state, "lidar", &filename).await
}

async fn gpkg_file_alias(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    download(&state, "gpkg", &filename).await
}

// =============================================================================
// Access requests
// =============================================================================

fn access_outcome(result: &Result<AccessReceipt, AccessError>) -> &'static str {
    match result {
        Ok(_) => "accepted",
        Err(AccessError::BodyTooLarge) | Err(AccessError::Invalid(_)) => "invalid",
        Err(AccessError::UnknownIdentity(_)) => "unknown_identity",
        Err(AccessError::DuplicateRequest(_)) => "duplicate",
        Err(AccessError::RateLimited(_)) => "rate_limited",
        Err(AccessError::LookupUnavailable(_)) => "lookup_unavailable",
        Err(AccessError::Storage(_)) => "storage_error",
    }
}

async fn access_request_handler(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<AccessReceipt>, ApiError> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            state.metrics.record_access_request("invalid");
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                return Err(AccessError::BodyTooLarge.into());
            }
            return Err(ApiError::BadRequest(rejection.body_text()));
        }
    };

    let remote_addr = client_addr(
        &headers,
        connect.map(|ConnectInfo(addr)| addr),
        state.config.rate_limit.trust_forwarded_for,
    );
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let result = state.access.submit(&body, &remote_addr, user_agent).await;
    state.metrics.record_access_request(access_outcome(&result));

    if let Err(AccessError::RateLimited(reason)) = &result {
        warn!(remote_addr = %remote_addr, reason = %reason, "Access request throttled");
    }
    Ok(Json(result?))
}
