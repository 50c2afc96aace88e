use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::enums::{AppointmentStatus, PrescriptionStatus, Role};

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PrescriptionFilter {
    pub status: Option<PrescriptionStatus>,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub pharmacy_id: Option<Uuid>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub department_id: Option<Uuid>,
    pub active_only: bool,
    pub search: Option<String>,
}
