//! The caller's own account.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::accounts::{self, ProfileUpdate};
use crate::api::endpoints::auth::UserResponse;
use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::types::{ApiContext, UserContext};

#[derive(Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

/// `GET /api/me`
pub async fn get(Extension(caller): Extension<UserContext>) -> Json<UserResponse> {
    Json(UserResponse { user: caller.user })
}

/// `PATCH /api/me`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let user = accounts::update_profile(&conn, &caller.user.id, update)?;
    Ok(Json(UserResponse { user }))
}

/// `POST /api/me/password`: revokes every session, including this one.
pub async fn change_password(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiJson(req): ApiJson<PasswordChange>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    accounts::change_password(&conn, &caller.user.id, &req.current_password, &req.new_password)?;
    Ok(StatusCode::NO_CONTENT)
}
