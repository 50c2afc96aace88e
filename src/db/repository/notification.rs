use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{fmt_ts, parse_ts, parse_uuid, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

pub fn insert_notification(conn: &Connection, n: &Notification) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO notifications (id, user_id, kind, title, message, link, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            n.id.to_string(),
            n.user_id.to_string(),
            n.kind.as_str(),
            n.title,
            n.message,
            n.link,
            n.is_read as i32,
            fmt_ts(&n.created_at),
        ],
    )?;
    Ok(())
}

/// Newest first. `limit` is clamped by the caller.
pub fn list_notifications(
    conn: &Connection,
    user_id: &Uuid,
    unread_only: bool,
    limit: u32,
) -> Result<Vec<Notification>, DatabaseError> {
    let sql = format!(
        "SELECT id, user_id, kind, title, message, link, is_read, created_at
         FROM notifications WHERE user_id = ?1 {}
         ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        if unread_only { "AND is_read = 0" } else { "" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id.to_string(), limit], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, i32>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut list = Vec::new();
    for row in rows {
        let (id, user_id, kind, title, message, link, is_read, created_at) = row?;
        list.push(Notification {
            id: parse_uuid(&id)?,
            user_id: parse_uuid(&user_id)?,
            kind: NotificationKind::from_str(&kind)?,
            title,
            message,
            link,
            is_read: is_read != 0,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(list)
}

/// Marks one notification read, scoped to its owner. Returns `false` if
/// the id does not exist for that user.
pub fn mark_notification_read(conn: &Connection, user_id: &Uuid, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), user_id.to_string()],
    )?;
    Ok(changed == 1)
}

pub fn mark_all_notifications_read(conn: &Connection, user_id: &Uuid) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
        params![user_id.to_string()],
    )?;
    Ok(changed)
}

pub fn count_unread_notifications(conn: &Connection, user_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
        params![user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}
