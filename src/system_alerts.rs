//! Platform-wide alerts surfaced to administrators.
//!
//! Raised by subsystems (inventory low-stock warnings) or by an admin by
//! hand. Listing and resolving are admin-only; pharmacies learn about
//! their own stock through notifications instead.

use rusqlite::Connection;
use uuid::Uuid;

use crate::authorization::{self, Action, AuthorizationError};
use crate::db::{self, repository, DatabaseError};
use crate::models::enums::AlertSeverity;
use crate::models::{SystemAlert, User};

#[derive(Debug, thiserror::Error)]
pub enum SystemAlertError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Forbidden(#[from] AuthorizationError),
    #[error("Alert not found or already resolved")]
    NotFound,
    #[error("Alert message must not be empty")]
    EmptyMessage,
}

pub fn raise(
    conn: &Connection,
    severity: AlertSeverity,
    source: &str,
    message: &str,
) -> Result<SystemAlert, SystemAlertError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(SystemAlertError::EmptyMessage);
    }
    let alert = SystemAlert {
        id: Uuid::new_v4(),
        severity,
        source: source.to_string(),
        message: message.to_string(),
        is_resolved: false,
        resolved_by: None,
        resolved_at: None,
        created_at: db::now(),
    };
    repository::insert_system_alert(conn, &alert)?;

    match severity {
        AlertSeverity::Critical => tracing::error!(source, message, "System alert raised"),
        AlertSeverity::Warning => tracing::warn!(source, message, "System alert raised"),
        AlertSeverity::Info => tracing::info!(source, message, "System alert raised"),
    }
    Ok(alert)
}

pub fn list(
    conn: &Connection,
    user: &User,
    active_only: bool,
) -> Result<Vec<SystemAlert>, SystemAlertError> {
    authorization::require(user, Action::ManageSystemAlerts)?;
    Ok(repository::list_system_alerts(conn, active_only)?)
}

pub fn resolve(conn: &Connection, admin: &User, id: &Uuid) -> Result<(), SystemAlertError> {
    authorization::require(admin, Action::ManageSystemAlerts)?;
    if repository::resolve_system_alert(conn, id, &admin.id, &db::now())? {
        tracing::info!(alert_id = %id, resolved_by = %admin.id, "System alert resolved");
        Ok(())
    } else {
        Err(SystemAlertError::NotFound)
    }
}
