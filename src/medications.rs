//! Medication views: a catalog of what pharmacies stock, where a given
//! medication can be filled, and a patient's own medication list.

use rusqlite::Connection;
use uuid::Uuid;

use crate::authorization::AuthorizationError;
use crate::db::{repository, DatabaseError};
use crate::models::enums::Role;
use crate::models::{AppointmentFilter, MedicationAvailability, PatientMedication, PharmacyStock, User};

pub const CATALOG_LIMIT: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum MedicationError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Forbidden(#[from] AuthorizationError),
    #[error("Medication name must not be empty")]
    EmptyName,
}

/// Medications stocked anywhere on the platform, optionally filtered by
/// a name fragment.
pub fn catalog(conn: &Connection, query: Option<&str>) -> Result<Vec<MedicationAvailability>, MedicationError> {
    Ok(repository::search_medication_catalog(conn, query, CATALOG_LIMIT)?)
}

/// Pharmacies that can fill `quantity` units of `medication_name`,
/// cheapest first. Patients use this to choose where to route.
pub fn stocking_pharmacies(
    conn: &Connection,
    medication_name: &str,
    quantity: Option<i64>,
) -> Result<Vec<PharmacyStock>, MedicationError> {
    let name = medication_name.trim();
    if name.is_empty() {
        return Err(MedicationError::EmptyName);
    }
    Ok(repository::list_pharmacies_stocking(conn, name, quantity.unwrap_or(1).max(1))?)
}

/// The caller's prescribed medications. Patients only.
pub fn for_patient(
    conn: &Connection,
    patient: &User,
    active_only: bool,
) -> Result<Vec<PatientMedication>, MedicationError> {
    if patient.role != Role::Patient {
        return Err(AuthorizationError::Forbidden {
            role: patient.role,
            action: "view_own_medications",
        }
        .into());
    }
    Ok(repository::list_patient_medications(conn, &patient.id, active_only)?)
}

/// Patient medication list on behalf of a doctor who has treated them,
/// or an admin.
pub fn for_patient_as_clinician(
    conn: &Connection,
    clinician: &User,
    patient_id: &Uuid,
) -> Result<Vec<PatientMedication>, MedicationError> {
    let treated = match clinician.role {
        Role::Admin => true,
        Role::Doctor => {
            let filter = AppointmentFilter {
                doctor_id: Some(clinician.id),
                patient_id: Some(*patient_id),
                ..AppointmentFilter::default()
            };
            !repository::list_appointments(conn, &filter)?.is_empty()
        }
        Role::Patient | Role::Pharmacy => false,
    };
    if !treated {
        return Err(AuthorizationError::NotParticipant("patient record").into());
    }
    Ok(repository::list_patient_medications(conn, patient_id, false)?)
}
