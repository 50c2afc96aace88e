use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AlertSeverity;

/// Platform-wide alert surfaced on the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAlert {
    pub id: Uuid,
    pub severity: AlertSeverity,
    /// Subsystem that raised the alert, e.g. `inventory` or `admin`.
    pub source: String,
    pub message: String,
    pub is_resolved: bool,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}
