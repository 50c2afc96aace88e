//! Pharmacy inventory endpoints.
//!
//! Pharmacies manage their own shelf; admins may read any pharmacy's
//! inventory with `?pharmacy_id=`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiQuery, PathId};
use crate::api::types::{ApiContext, UserContext};
use crate::inventory::{self, InventoryUpdate, NewInventoryItem};
use crate::models::InventoryItem;

#[derive(Deserialize)]
pub struct InventoryQuery {
    pub pharmacy_id: Option<Uuid>,
    #[serde(default)]
    pub low_stock: bool,
}

#[derive(Deserialize)]
pub struct Adjustment {
    pub delta: i64,
}

#[derive(Serialize)]
pub struct InventoryResponse {
    pub items: Vec<InventoryItem>,
}

#[derive(Serialize)]
pub struct ItemResponse {
    pub item: InventoryItem,
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiQuery(query): ApiQuery<InventoryQuery>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let items = inventory::list_items(&conn, &caller.user, query.pharmacy_id, query.low_stock)?;
    Ok(Json(InventoryResponse { items }))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiJson(req): ApiJson<NewInventoryItem>,
) -> Result<(StatusCode, Json<ItemResponse>), ApiError> {
    let conn = ctx.core.open_db()?;
    let item = inventory::add_item(&conn, &caller.user, req)?;
    Ok((StatusCode::CREATED, Json(ItemResponse { item })))
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
    ApiJson(req): ApiJson<InventoryUpdate>,
) -> Result<Json<ItemResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let item = inventory::update_item(&conn, &caller.user, &id, req)?;
    Ok(Json(ItemResponse { item }))
}

pub async fn adjust(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
    ApiJson(req): ApiJson<Adjustment>,
) -> Result<Json<ItemResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let item = inventory::adjust_quantity(&conn, &caller.user, &id, req.delta)?;
    Ok(Json(ItemResponse { item }))
}

pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    inventory::remove_item(&conn, &caller.user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
