use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// Flattened audit row: `(timestamp, source, action, entity, user_id)`.
pub type AuditRow = (String, String, String, String, Option<String>);

/// Insert a batch of audit entries into the audit_log table.
pub fn insert_audit_entries(conn: &Connection, entries: &[AuditRow]) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO audit_log (timestamp, source, action, entity, user_id) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (timestamp, source, action, entity, user_id) in entries {
        stmt.execute(params![timestamp, source, action, entity, user_id])?;
    }
    Ok(())
}

/// Prune audit entries older than the given number of days.
pub fn prune_audit_log(conn: &Connection, retention_days: i64) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM audit_log WHERE timestamp < datetime('now', ?1)",
        params![format!("-{retention_days} days")],
    )?;
    Ok(deleted)
}

/// Most recent audit entries, optionally for one user.
pub fn query_recent_audit(
    conn: &Connection,
    user_id: Option<&str>,
    limit: u32,
) -> Result<Vec<AuditRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, source, action, entity, user_id FROM audit_log
         WHERE ?1 IS NULL OR user_id = ?1
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![user_id, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
