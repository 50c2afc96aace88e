//! Session endpoints.
//!
//! - `POST /api/auth/register`: public patient self-registration
//! - `POST /api/auth/login`: exchange credentials for a bearer token
//! - `POST /api/auth/logout`: revoke the calling token

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::accounts::{self, NewUser, Session};
use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::types::{ApiContext, UserContext};
use crate::models::User;

#[derive(Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn register(
    State(ctx): State<ApiContext>,
    ApiJson(req): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let conn = ctx.core.open_db()?;
    let user = accounts::register_patient(&conn, req)?;
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

pub async fn login(
    State(ctx): State<ApiContext>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<Session>, ApiError> {
    let conn = ctx.core.open_db()?;
    let session = accounts::login(&conn, &req.email, &req.password, ctx.core.session_ttl_hours())?;
    Ok(Json(session))
}

pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    accounts::logout(&conn, &caller.token)?;
    tracing::info!(user_id = %caller.user.id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}
