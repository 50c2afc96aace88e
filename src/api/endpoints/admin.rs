//! Administration endpoints: accounts, system alerts and the audit trail.
//! Department maintenance lives with the other department handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts::{self, NewUser};
use crate::api::endpoints::auth::UserResponse;
use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiQuery, PathId};
use crate::api::types::{ApiContext, UserContext};
use crate::authorization::{self, Action};
use crate::db::repository;
use crate::models::enums::AlertSeverity;
use crate::models::{SystemAlert, User, UserFilter};
use crate::system_alerts;

const AUDIT_DEFAULT_LIMIT: u32 = 100;
const AUDIT_MAX_LIMIT: u32 = 1000;

// ═══════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════

#[derive(Serialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

#[derive(Deserialize)]
pub struct ActiveChange {
    pub active: bool,
}

pub async fn list_users(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiQuery(filter): ApiQuery<UserFilter>,
) -> Result<Json<UsersResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let users = accounts::list_users(&conn, &caller.user, &filter)?;
    Ok(Json(UsersResponse { users }))
}

pub async fn create_user(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiJson(req): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let conn = ctx.core.open_db()?;
    let user = accounts::create_user(&conn, &caller.user, req)?;
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

pub async fn set_active(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
    ApiJson(req): ApiJson<ActiveChange>,
) -> Result<Json<UserResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let user = accounts::set_active(&conn, &caller.user, &id, req.active)?;
    Ok(Json(UserResponse { user }))
}

// ═══════════════════════════════════════════════════════════
// System alerts
// ═══════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub struct AlertQuery {
    #[serde(default)]
    pub include_resolved: bool,
}

#[derive(Deserialize)]
pub struct NewAlert {
    pub severity: AlertSeverity,
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<SystemAlert>,
}

#[derive(Serialize)]
pub struct AlertResponse {
    pub alert: SystemAlert,
}

pub async fn list_alerts(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiQuery(query): ApiQuery<AlertQuery>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let alerts = system_alerts::list(&conn, &caller.user, !query.include_resolved)?;
    Ok(Json(AlertsResponse { alerts }))
}

pub async fn raise_alert(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiJson(req): ApiJson<NewAlert>,
) -> Result<(StatusCode, Json<AlertResponse>), ApiError> {
    authorization::require(&caller.user, Action::ManageSystemAlerts)?;
    let conn = ctx.core.open_db()?;
    let source = req.source.as_deref().unwrap_or("admin");
    let alert = system_alerts::raise(&conn, req.severity, source, &req.message)?;
    Ok((StatusCode::CREATED, Json(AlertResponse { alert })))
}

pub async fn resolve_alert(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    PathId(id): PathId,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    system_alerts::resolve(&conn, &caller.user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ═══════════════════════════════════════════════════════════
// Audit trail
// ═══════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub struct AuditQuery {
    pub user_id: Option<Uuid>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub source: String,
    pub action: String,
    pub entity: String,
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub struct AuditResponse {
    pub entries: Vec<AuditRecord>,
}

/// `GET /api/admin/audit`: most recent first. Buffered entries are
/// flushed before reading.
pub async fn audit(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    ApiQuery(query): ApiQuery<AuditQuery>,
) -> Result<Json<AuditResponse>, ApiError> {
    authorization::require(&caller.user, Action::ViewAuditLog)?;
    ctx.core.flush_audit()?;

    let conn = ctx.core.open_db()?;
    let limit = query.limit.unwrap_or(AUDIT_DEFAULT_LIMIT).clamp(1, AUDIT_MAX_LIMIT);
    let user_id = query.user_id.map(|id| id.to_string());
    let entries = repository::query_recent_audit(&conn, user_id.as_deref(), limit)?
        .into_iter()
        .map(|(timestamp, source, action, entity, user_id)| AuditRecord {
            timestamp,
            source,
            action,
            entity,
            user_id,
        })
        .collect();
    Ok(Json(AuditResponse { entries }))
}
