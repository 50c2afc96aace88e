//! Department endpoints.
//!
//! - `GET /api/departments`: public directory
//! - `GET /api/departments/:id/doctors`: active doctors in a department
//! - `POST/PATCH/DELETE /api/admin/departments[/:id]`: admin maintenance

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, PathId};
use crate::api::types::{ApiContext, UserContext};
use crate::departments::{self, DepartmentInput};
use crate::models::{Department, User};

#[derive(Serialize)]
pub struct DepartmentsResponse {
    pub departments: Vec<Department>,
}

#[derive(Serialize)]
pub struct DepartmentResponse {
    pub department: Department,
}

#[derive(Serialize)]
pub struct DoctorsResponse {
    pub doctors: Vec<User>,
}

pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<DepartmentsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let departments = departments::list(&conn)?;
    Ok(Json(DepartmentsResponse { departments }))
}

pub async fn doctors(
    State(ctx): State<ApiContext>,
    Extension(_caller): Extension<UserContext>,
    PathId(id): PathId,
) -> Result<Json<DoctorsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let doctors = departments::doctors(&conn, &id)?;
    Ok(Json(DoctorsResponse { doctors }))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiJson(input): ApiJson<DepartmentInput>,
) -> Result<(StatusCode, Json<DepartmentResponse>), ApiError> {
    let conn = ctx.core.open_db()?;
    let department = departments::create(&conn, &caller.user, input)?;
    Ok((StatusCode::CREATED, Json(DepartmentResponse { department })))
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
    ApiJson(input): ApiJson<DepartmentInput>,
) -> Result<Json<DepartmentResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let department = departments::update(&conn, &caller.user, &id, input)?;
    Ok(Json(DepartmentResponse { department }))
}

pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    departments::delete(&conn, &caller.user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
