//! HTTP middleware for atlas-gateway
//!
//! This module provides middleware layers for:
//! - Request rate limiting (per client key and global)
//! - Bearer-token authentication
//! - Request/response logging and metrics

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;

use crate::auth::RateDecision;
use crate::error::AuthError;
use crate::models::Identity;

use super::router::AppState;
use super::ApiError;

/// Paths never subject to rate limiting
const RATE_LIMIT_SKIP_PATHS: &[&str] = &["/healthz"];

/// Identity proven by the request's bearer token
#[derive(Clone, Debug)]
pub struct AuthenticatedIdentity(pub Identity);

/// Key under which a request is counted
///
/// The peer address, or the first `X-Forwarded-For` hop when the gateway
/// sits behind a trusted proxy.
pub fn client_key(request: &Request, trust_forwarded_for: bool) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_addr(request.headers(), peer, trust_forwarded_for)
}

/// Client address from the peer socket or a trusted forwarding header
pub fn client_addr(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        if let Some(hop) = forwarded_for(headers) {
            return hop;
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string)
}

/// Extract the token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingAuth)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Unauthorized)
}

/// Rate-limit middleware
///
/// Runs before token validation so refused clients cost no further work.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if RATE_LIMIT_SKIP_PATHS.contains(&request.uri().path()) || !state.limiter.is_enabled() {
        return Ok(next.run(request).await);
    }

    let key = client_key(&request, state.config.rate_limit.trust_forwarded_for);
    match state.limiter.check(&key) {
        RateDecision::Allowed => Ok(next.run(request).await),
        RateDecision::Denied {
            scope,
            retry_after_secs,
        } => {
            tracing::warn!(
                client = %key,
                scope = scope.as_str(),
                path = %request.uri().path(),
                "Rate limit exceeded"
            );
            state.metrics.record_rate_limited(scope.as_str());
            Err(ApiError::RateLimited { retry_after_secs })
        }
    }
}

/// Bearer-token middleware
///
/// Adds the [`AuthenticatedIdentity`] to the request extensions. With
/// authentication disabled every request is `anonymous`.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = if state.auth.is_enabled() {
        let token = bearer_token(request.headers())?;
        state.auth.validate_token(token)?
    } else {
        Identity::anonymous()
    };

    request
        .extensions_mut()
        .insert(AuthenticatedIdentity(identity));
    Ok(next.run(request).await)
}

/// Logging middleware
///
/// Logs method, route, status and duration, and records request metrics
/// under the matched route pattern.
pub async fn logging_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %elapsed.as_millis(),
        "Request completed"
    );
    state
        .metrics
        .record_request(&route, status.as_u16(), elapsed.as_secs_f64());

    response
}
