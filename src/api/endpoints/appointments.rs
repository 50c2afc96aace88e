//! Appointment endpoints.
//!
//! - `GET /api/appointments`: caller's appointments, filterable
//! - `POST /api/appointments`: patient books a doctor
//! - `GET /api/appointments/:id`
//! - `POST /api/appointments/:id/status`: confirm, cancel, complete, no-show
//! - `POST /api/appointments/:id/reschedule`

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiQuery, PathId};
use crate::api::types::{ApiContext, UserContext};
use crate::appointment::{self, BookingRequest};
use crate::models::enums::AppointmentStatus;
use crate::models::{Appointment, AppointmentFilter};

#[derive(Serialize)]
pub struct AppointmentsResponse {
    pub appointments: Vec<Appointment>,
}

#[derive(Serialize)]
pub struct AppointmentResponse {
    pub appointment: Appointment,
}

#[derive(Deserialize)]
pub struct StatusChange {
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub scheduled_at: NaiveDateTime,
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiQuery(filter): ApiQuery<AppointmentFilter>,
) -> Result<Json<AppointmentsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let appointments = appointment::list_for(&conn, &caller.user, filter)?;
    Ok(Json(AppointmentsResponse { appointments }))
}

pub async fn book(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiJson(req): ApiJson<BookingRequest>,
) -> Result<(StatusCode, Json<AppointmentResponse>), ApiError> {
    let conn = ctx.core.open_db()?;
    let appointment = appointment::book(&conn, &caller.user, req)?;
    Ok((StatusCode::CREATED, Json(AppointmentResponse { appointment })))
}

pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
) -> Result<Json<AppointmentResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let appointment = appointment::get_for(&conn, &caller.user, &id)?;
    Ok(Json(AppointmentResponse { appointment }))
}

pub async fn set_status(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
    ApiJson(req): ApiJson<StatusChange>,
) -> Result<Json<AppointmentResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let appointment =
        appointment::transition(&conn, &caller.user, &id, req.status, req.notes.as_deref())?;
    Ok(Json(AppointmentResponse { appointment }))
}

pub async fn reschedule(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
    ApiJson(req): ApiJson<RescheduleRequest>,
) -> Result<Json<AppointmentResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let appointment = appointment::reschedule(&conn, &caller.user, &id, req.scheduled_at)?;
    Ok(Json(AppointmentResponse { appointment }))
}
