use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::NotificationKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Client route the notification points at, e.g. `/prescriptions/<id>`.
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}
