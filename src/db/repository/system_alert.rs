use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{fmt_ts, parse_ts, parse_uuid, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

pub fn insert_system_alert(conn: &Connection, alert: &SystemAlert) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO system_alerts (id, severity, source, message, is_resolved, resolved_by,
         resolved_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            alert.id.to_string(),
            alert.severity.as_str(),
            alert.source,
            alert.message,
            alert.is_resolved as i32,
            alert.resolved_by.map(|id| id.to_string()),
            alert.resolved_at.map(|ts| fmt_ts(&ts)),
            fmt_ts(&alert.created_at),
        ],
    )?;
    Ok(())
}

pub fn list_system_alerts(conn: &Connection, active_only: bool) -> Result<Vec<SystemAlert>, DatabaseError> {
    let sql = format!(
        "SELECT id, severity, source, message, is_resolved, resolved_by, resolved_at, created_at
         FROM system_alerts {}
         ORDER BY created_at DESC, rowid DESC",
        if active_only { "WHERE is_resolved = 0" } else { "" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i32>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut alerts = Vec::new();
    for row in rows {
        let (id, severity, source, message, is_resolved, resolved_by, resolved_at, created_at) = row?;
        alerts.push(SystemAlert {
            id: parse_uuid(&id)?,
            severity: AlertSeverity::from_str(&severity)?,
            source,
            message,
            is_resolved: is_resolved != 0,
            resolved_by: resolved_by.as_deref().map(parse_uuid).transpose()?,
            resolved_at: resolved_at.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(alerts)
}

/// Resolve an open alert. Returns `false` if it does not exist or was
/// already resolved.
pub fn resolve_system_alert(
    conn: &Connection,
    id: &Uuid,
    resolved_by: &Uuid,
    resolved_at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE system_alerts SET is_resolved = 1, resolved_by = ?2, resolved_at = ?3
         WHERE id = ?1 AND is_resolved = 0",
        params![id.to_string(), resolved_by.to_string(), fmt_ts(resolved_at)],
    )?;
    Ok(changed == 1)
}

pub fn count_active_system_alerts(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM system_alerts WHERE is_resolved = 0",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
