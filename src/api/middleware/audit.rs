//! Audit logging middleware.
//!
//! Logs every API request with user id, method, path and response
//! status. Runs innermost, after auth has injected `UserContext`.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::{ApiContext, UserContext};
use crate::core_state::AccessSource;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let ctx = req.extensions().get::<ApiContext>().cloned();
    let user_id = req.extensions().get::<UserContext>().map(|u| u.user.id);

    let response = next.run(req).await;

    let status = response.status().as_u16();
    tracing::debug!(%method, %path, status, user_id = ?user_id, "API request");

    if let Some(ctx) = ctx {
        ctx.core.log_access(
            AccessSource::Api { user_id },
            &format!("{method} {path}"),
            &format!("status:{status}"),
        );
    }

    response
}
