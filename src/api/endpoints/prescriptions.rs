//! Prescription endpoints.
//!
//! - `GET /api/prescriptions`: role-scoped list
//! - `POST /api/prescriptions`: doctor issues after an appointment
//! - `GET /api/prescriptions/:id`: detail with medications and history
//! - `POST /api/prescriptions/:id/status`: move through the fulfilment flow
//! - `POST /api/prescriptions/:id/route`: send to a pharmacy

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiQuery, PathId};
use crate::api::types::{ApiContext, UserContext};
use crate::models::enums::PrescriptionStatus;
use crate::models::{Prescription, PrescriptionFilter};
use crate::prescription::{self, IssueRequest, PrescriptionDetail};

#[derive(Serialize)]
pub struct PrescriptionsResponse {
    pub prescriptions: Vec<Prescription>,
}

#[derive(Serialize)]
pub struct PrescriptionResponse {
    pub prescription: PrescriptionDetail,
}

#[derive(Deserialize)]
pub struct StatusChange {
    pub status: PrescriptionStatus,
    #[serde(default)]
    pub note: Option<String>,
    /// Only read when moving to SENT_TO_PHARMACY.
    #[serde(default)]
    pub pharmacy_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct RouteRequest {
    pub pharmacy_id: Uuid,
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiQuery(filter): ApiQuery<PrescriptionFilter>,
) -> Result<Json<PrescriptionsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let prescriptions = prescription::list_for(&conn, &caller.user, filter)?;
    Ok(Json(PrescriptionsResponse { prescriptions }))
}

pub async fn issue(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiJson(req): ApiJson<IssueRequest>,
) -> Result<(StatusCode, Json<PrescriptionResponse>), ApiError> {
    let conn = ctx.core.open_db()?;
    let detail = prescription::issue(&conn, &caller.user, req)?;
    Ok((StatusCode::CREATED, Json(PrescriptionResponse { prescription: detail })))
}

pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
) -> Result<Json<PrescriptionResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let detail = prescription::get_detail(&conn, &caller.user, &id)?;
    Ok(Json(PrescriptionResponse { prescription: detail }))
}

pub async fn set_status(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
    ApiJson(req): ApiJson<StatusChange>,
) -> Result<Json<PrescriptionResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    prescription::transition(
        &conn,
        &caller.user,
        &id,
        req.status,
        req.note.as_deref(),
        req.pharmacy_id,
    )?;
    let detail = prescription::get_detail(&conn, &caller.user, &id)?;
    Ok(Json(PrescriptionResponse { prescription: detail }))
}

pub async fn route(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
    ApiJson(req): ApiJson<RouteRequest>,
) -> Result<Json<PrescriptionResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    prescription::route_to_pharmacy(&conn, &caller.user, &id, req.pharmacy_id)?;
    let detail = prescription::get_detail(&conn, &caller.user, &id)?;
    Ok(Json(PrescriptionResponse { prescription: detail }))
}
