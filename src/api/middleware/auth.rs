//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, resolves it to an active
//! user session and injects `UserContext` into request extensions for
//! downstream handlers. Rejected tokens count against the peer's rate
//! limit bucket, so guessing tokens is throttled like guessing passwords.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::accounts;
use crate::api::error::ApiError;
use crate::api::middleware::rate;
use crate::api::types::{ApiContext, UserContext};

/// Require a valid session token.
///
/// On success: injects `UserContext` and marks the response
/// `Cache-Control: no-store`.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let Some(token) = token else {
        rate::check(&ctx, &rate::peer_key(&req))?;
        return Err(ApiError::unauthenticated());
    };

    // Connection dropped before the handler runs
    let authenticated = {
        let conn = ctx.core.open_db()?;
        accounts::authenticate(&conn, &token)
    };
    let user = match authenticated {
        Ok(user) => user,
        Err(err) => {
            rate::check(&ctx, &rate::peer_key(&req))?;
            return Err(err.into());
        }
    };

    req.extensions_mut().insert(UserContext { user, token });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));

    Ok(response)
}
