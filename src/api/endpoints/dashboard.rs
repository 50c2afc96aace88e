use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::dashboard::{self, Dashboard};

#[derive(Serialize)]
pub struct DashboardResponse {
    pub dashboard: Dashboard,
}

/// `GET /api/dashboard`: summary shaped by the caller's role.
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let dashboard = dashboard::for_user(&conn, &caller.user)?;
    Ok(Json(DashboardResponse { dashboard }))
}
