//! Per-client rate limiting middleware.
//!
//! Sliding-window limits per client (100/minute, 1000/hour). Before
//! authentication a client is its peer address; caller-supplied headers
//! never pick the bucket. Once auth has resolved a session the bucket is
//! the user, so staff sharing one clinic address do not starve each other.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};

/// Bucket for a request that has not been authenticated.
pub fn peer_key(req: &Request<axum::body::Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Count one request against `key`.
pub fn check(ctx: &ApiContext, key: &str) -> Result<(), ApiError> {
    let mut limiter = ctx
        .rate_limiter
        .lock()
        .map_err(|_| ApiError::Internal("rate limiter lock".into()))?;

    limiter.check(key).map_err(|retry_after| {
        tracing::warn!(client = %key, retry_after, "Rate limit exceeded");
        ApiError::RateLimited { retry_after }
    })
}

/// Public routes: limit by peer address.
pub async fn limit(req: Request<axum::body::Body>, next: Next) -> Response {
    let key = peer_key(&req);
    match guard(&req, &key) {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// Protected routes: runs inside auth and limits by user id.
pub async fn limit_user(req: Request<axum::body::Body>, next: Next) -> Response {
    let key = match req.extensions().get::<UserContext>() {
        Some(caller) => format!("user:{}", caller.user.id),
        None => peer_key(&req),
    };
    match guard(&req, &key) {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

// MutexGuard is !Send, so the check stays out of the async fns' await points
fn guard(req: &Request<axum::body::Body>, key: &str) -> Result<(), ApiError> {
    let ctx = req
        .extensions()
        .get::<ApiContext>()
        .ok_or(ApiError::Internal("missing API context".into()))?;
    check(ctx, key)
}
