use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::extract::{ApiQuery, PathId};
use crate::api::types::{ApiContext, UserContext};
use crate::models::Notification;
use crate::notifications;

#[derive(Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

#[derive(Serialize)]
pub struct MarkedResponse {
    pub updated: usize,
}

/// `GET /api/notifications?unread_only=&limit=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<Json<NotificationsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let notifications = notifications::list(&conn, &caller.user, query.unread_only, query.limit)?;
    let unread_count = notifications::unread_count(&conn, &caller.user)?;
    Ok(Json(NotificationsResponse {
        notifications,
        unread_count,
    }))
}

pub async fn mark_read(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    notifications::mark_read(&conn, &caller.user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
) -> Result<Json<MarkedResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let updated = notifications::mark_all_read(&conn, &caller.user)?;
    Ok(Json(MarkedResponse { updated }))
}
