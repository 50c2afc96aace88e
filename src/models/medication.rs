use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::PrescriptionStatus;

/// One medication name aggregated across every pharmacy shelf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationAvailability {
    pub medication_name: String,
    /// Pharmacies with at least one unit in stock.
    pub pharmacies: i64,
    pub total_quantity: i64,
    pub lowest_price_cents: Option<i64>,
}

/// A pharmacy that currently stocks a given medication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PharmacyStock {
    pub pharmacy_id: Uuid,
    pub pharmacy_name: String,
    pub address: Option<String>,
    pub quantity: i64,
    pub unit: String,
    pub unit_price_cents: i64,
}

/// A prescribed medication line from the patient's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientMedication {
    pub prescription_id: Uuid,
    pub prescription_status: PrescriptionStatus,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub quantity: i64,
    pub instructions: Option<String>,
    pub prescriber_name: String,
    pub issued_at: NaiveDateTime,
}
