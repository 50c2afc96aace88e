use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::PrescriptionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub pharmacy_id: Option<Uuid>,
    pub status: PrescriptionStatus,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    /// Incremented on every status change; used as the compare-and-set token.
    pub version: i64,
    pub stock_reserved: bool,
    pub issued_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionMedication {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub quantity: i64,
    pub instructions: Option<String>,
}

/// One row of the status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionEvent {
    pub id: i64,
    pub prescription_id: Uuid,
    pub from_status: Option<PrescriptionStatus>,
    pub to_status: PrescriptionStatus,
    pub actor_id: Uuid,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
}
