//! Doctor directory and bookable slots.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts;
use crate::api::endpoints::departments::DoctorsResponse;
use crate::api::error::ApiError;
use crate::api::extract::{ApiQuery, PathId};
use crate::api::types::{ApiContext, UserContext};
use crate::appointment::{self, Slot};
use crate::models::enums::Role;

#[derive(Deserialize)]
pub struct DoctorQuery {
    pub department_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
}

/// `GET /api/doctors?department_id=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(_caller): Extension<UserContext>,
    ApiQuery(query): ApiQuery<DoctorQuery>,
) -> Result<Json<DoctorsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let doctors = accounts::list_active_by_role(&conn, Role::Doctor)?
        .into_iter()
        .filter(|d| query.department_id.is_none() || d.department_id == query.department_id)
        .collect();
    Ok(Json(DoctorsResponse { doctors }))
}

/// `GET /api/doctors/:id/availability?date=YYYY-MM-DD`
pub async fn availability(
    State(ctx): State<ApiContext>,
    Extension(_caller): Extension<UserContext>,
    PathId(doctor_id): PathId,
    ApiQuery(query): ApiQuery<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let slots = appointment::doctor_availability(&conn, &doctor_id, query.date)?;
    Ok(Json(AvailabilityResponse {
        doctor_id,
        date: query.date,
        slots,
    }))
}
