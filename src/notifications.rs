//! In-app notifications.
//!
//! Per-user messages written alongside the change that caused them
//! (same connection, same transaction).

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, repository, DatabaseError};
use crate::models::enums::NotificationKind;
use crate::models::{Notification, User};

/// Upper bound on a single notification page.
pub const MAX_PAGE: u32 = 200;
pub const DEFAULT_PAGE: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Notification not found")]
    NotFound,
}

/// Write a notification for `user_id`.
pub fn notify(
    conn: &Connection,
    user_id: &Uuid,
    kind: NotificationKind,
    title: &str,
    message: &str,
    link: Option<String>,
) -> Result<Notification, DatabaseError> {
    let notification = Notification {
        id: Uuid::new_v4(),
        user_id: *user_id,
        kind,
        title: title.to_string(),
        message: message.to_string(),
        link,
        is_read: false,
        created_at: db::now(),
    };
    repository::insert_notification(conn, &notification)?;
    tracing::debug!(user_id = %user_id, kind = kind.as_str(), "Notification queued");
    Ok(notification)
}

pub fn list(
    conn: &Connection,
    user: &User,
    unread_only: bool,
    limit: Option<u32>,
) -> Result<Vec<Notification>, NotificationError> {
    let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    Ok(repository::list_notifications(conn, &user.id, unread_only, limit)?)
}

pub fn mark_read(conn: &Connection, user: &User, id: &Uuid) -> Result<(), NotificationError> {
    if repository::mark_notification_read(conn, &user.id, id)? {
        Ok(())
    } else {
        Err(NotificationError::NotFound)
    }
}

pub fn mark_all_read(conn: &Connection, user: &User) -> Result<usize, NotificationError> {
    Ok(repository::mark_all_notifications_read(conn, &user.id)?)
}

pub fn unread_count(conn: &Connection, user: &User) -> Result<i64, NotificationError> {
    Ok(repository::count_unread_notifications(conn, &user.id)?)
}
