use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;

use crate::accounts;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::models::enums::Role;
use crate::models::User;

#[derive(Serialize)]
pub struct PharmaciesResponse {
    pub pharmacies: Vec<User>,
}

/// `GET /api/pharmacies`: active pharmacies a prescription can be routed to.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(_caller): Extension<UserContext>,
) -> Result<Json<PharmaciesResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let pharmacies = accounts::list_active_by_role(&conn, Role::Pharmacy)?;
    Ok(Json(PharmaciesResponse { pharmacies }))
}
