use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{fmt_ts, parse_ts, parse_uuid, DatabaseError};
use chrono::NaiveDateTime;

pub fn insert_session(
    conn: &Connection,
    token_hash: &str,
    user_id: &Uuid,
    created_at: &NaiveDateTime,
    expires_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![token_hash, user_id.to_string(), fmt_ts(created_at), fmt_ts(expires_at)],
    )?;
    Ok(())
}

/// Returns `(user_id, expires_at)` for a stored token hash.
pub fn get_session(
    conn: &Connection,
    token_hash: &str,
) -> Result<Option<(Uuid, NaiveDateTime)>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT user_id, expires_at FROM sessions WHERE token_hash = ?1",
            params![token_hash],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    match row {
        Some((user_id, expires_at)) => Ok(Some((parse_uuid(&user_id)?, parse_ts(&expires_at)?))),
        None => Ok(None),
    }
}

pub fn delete_session(conn: &Connection, token_hash: &str) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        params![token_hash],
    )?;
    Ok(deleted > 0)
}

pub fn delete_user_sessions(conn: &Connection, user_id: &Uuid) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE user_id = ?1",
        params![user_id.to_string()],
    )?;
    Ok(deleted)
}

pub fn delete_expired_sessions(conn: &Connection, now: &NaiveDateTime) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![fmt_ts(now)],
    )?;
    Ok(deleted)
}
