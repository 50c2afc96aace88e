use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AppointmentMode, AppointmentStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    pub duration_minutes: i64,
    pub mode: AppointmentMode,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub meeting_link: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Appointment {
    pub fn ends_at(&self) -> NaiveDateTime {
        self.scheduled_at + Duration::minutes(self.duration_minutes)
    }

    /// Half-open interval overlap: back-to-back slots do not collide.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.scheduled_at < end && start < self.ends_at()
    }

    pub fn involves(&self, user_id: &Uuid) -> bool {
        &self.patient_id == user_id || &self.doctor_id == user_id
    }
}
