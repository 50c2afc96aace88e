//! Medication lookups.
//!
//! - `GET /api/medications?q=`: catalog across pharmacies
//! - `GET /api/medications/mine?active_only=`: patient's prescribed lines
//! - `GET /api/medications/pharmacies?name=&quantity=`: where to fill
//! - `GET /api/patients/:id/medications`: clinician view

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::extract::{ApiQuery, PathId};
use crate::api::types::{ApiContext, UserContext};
use crate::medications;
use crate::models::{MedicationAvailability, PatientMedication, PharmacyStock};

#[derive(Deserialize)]
pub struct CatalogQuery {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct MineQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Deserialize)]
pub struct StockQuery {
    pub name: String,
    pub quantity: Option<i64>,
}

#[derive(Serialize)]
pub struct CatalogResponse {
    pub medications: Vec<MedicationAvailability>,
}

#[derive(Serialize)]
pub struct PatientMedicationsResponse {
    pub medications: Vec<PatientMedication>,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub pharmacies: Vec<PharmacyStock>,
}

pub async fn catalog(
    State(ctx): State<ApiContext>,
    Extension(_caller): Extension<UserContext>,
    ApiQuery(query): ApiQuery<CatalogQuery>,
) -> Result<Json<CatalogResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let q = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
    let medications = medications::catalog(&conn, q)?;
    Ok(Json(CatalogResponse { medications }))
}

pub async fn mine(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiQuery(query): ApiQuery<MineQuery>,
) -> Result<Json<PatientMedicationsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let medications = medications::for_patient(&conn, &caller.user, query.active_only)?;
    Ok(Json(PatientMedicationsResponse { medications }))
}

pub async fn pharmacies(
    State(ctx): State<ApiContext>,
    Extension(_caller): Extension<UserContext>,
    ApiQuery(query): ApiQuery<StockQuery>,
) -> Result<Json<StockResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let pharmacies = medications::stocking_pharmacies(&conn, &query.name, query.quantity)?;
    Ok(Json(StockResponse { pharmacies }))
}

pub async fn for_patient(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(patient_id): PathId,
) -> Result<Json<PatientMedicationsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let medications = medications::for_patient_as_clinician(&conn, &caller.user, &patient_id)?;
    Ok(Json(PatientMedicationsResponse { medications }))
}
