//! Prescription lifecycle.
//!
//! ```text
//! ISSUED → SENT_TO_PHARMACY → RECEIVED_BY_PHARMACY → PHARMACY_ACCEPTED
//!        → PROCESSING → READY_FOR_PICKUP → COMPLETED
//! any non-terminal state → CANCELLED
//! ```
//!
//! Every move is checked against the transition table and the actor's
//! role, then applied as a compare-and-set on `(status, version)` so two
//! concurrent requests from the same state cannot both win. Entering
//! PROCESSING reserves stock at the routed pharmacy; cancelling while
//! stock is reserved puts it back. Each move appends a history event and
//! notifies the parties involved, all inside one transaction.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{self, Action, AuthorizationError};
use crate::db::{self, repository, DatabaseError, StatusUpdate};
use crate::inventory::{self, InventoryError};
use crate::models::enums::{AppointmentStatus, NotificationKind, PrescriptionStatus, Role};
use crate::models::{Prescription, PrescriptionEvent, PrescriptionFilter, PrescriptionMedication, User};
use crate::notifications;

#[derive(Debug, thiserror::Error)]
pub enum PrescriptionError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Forbidden(#[from] AuthorizationError),
    #[error(transparent)]
    Inventory(InventoryError),
    #[error("Prescription not found")]
    NotFound,
    #[error("Appointment not found")]
    AppointmentNotFound,
    #[error("Prescriptions can only be issued for confirmed or completed appointments (appointment is {0})")]
    AppointmentNotEligible(AppointmentStatus),
    #[error("A prescription needs at least one medication")]
    NoMedications,
    #[error("Invalid medication: {0}")]
    InvalidMedication(String),
    #[error("Pharmacy not found or inactive")]
    PharmacyUnavailable,
    #[error("A pharmacy must be chosen before sending")]
    PharmacyRequired,
    #[error("Cannot move prescription from {from} to {to}")]
    InvalidTransition {
        from: PrescriptionStatus,
        to: PrescriptionStatus,
    },
    #[error("Prescription was modified concurrently, reload and retry")]
    Conflict,
    #[error("Insufficient stock for {medication}")]
    InsufficientStock { medication: String },
}

impl From<InventoryError> for PrescriptionError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::InsufficientStock { medication, .. } => Self::InsufficientStock { medication },
            InventoryError::Database(e) => Self::Database(e),
            other => Self::Inventory(other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MedicationInput {
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub quantity: i64,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueRequest {
    pub appointment_id: Uuid,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub medications: Vec<MedicationInput>,
    /// Route immediately instead of leaving the choice to the patient.
    #[serde(default)]
    pub pharmacy_id: Option<Uuid>,
}

/// Prescription with its medication lines and status history.
#[derive(Debug, Clone, Serialize)]
pub struct PrescriptionDetail {
    #[serde(flatten)]
    pub prescription: Prescription,
    pub medications: Vec<PrescriptionMedication>,
    pub events: Vec<PrescriptionEvent>,
}

// ═══════════════════════════════════════════════════════════
// Transition table
// ═══════════════════════════════════════════════════════════

/// Structural validity of a move, independent of who asks.
pub fn is_valid_transition(from: PrescriptionStatus, to: PrescriptionStatus) -> bool {
    use PrescriptionStatus::*;
    match (from, to) {
        (Issued, SentToPharmacy)
        | (SentToPharmacy, ReceivedByPharmacy)
        | (ReceivedByPharmacy, PharmacyAccepted)
        | (PharmacyAccepted, Processing)
        | (Processing, ReadyForPickup)
        | (ReadyForPickup, Completed) => true,
        (from, Cancelled) => !from.is_terminal(),
        _ => false,
    }
}

/// May `actor` perform `from → to` on `rx`? Assumes the move is valid.
fn authorize_move(
    actor: &User,
    rx: &Prescription,
    from: PrescriptionStatus,
    to: PrescriptionStatus,
) -> Result<(), AuthorizationError> {
    use PrescriptionStatus::*;

    let is_routed_pharmacy = actor.role == Role::Pharmacy && rx.pharmacy_id == Some(actor.id);
    let is_issuing_doctor = actor.role == Role::Doctor && rx.doctor_id == actor.id;
    let is_patient = actor.role == Role::Patient && rx.patient_id == actor.id;

    let (action, allowed) = match to {
        SentToPharmacy => (
            Action::RoutePrescription,
            is_issuing_doctor || is_patient || actor.is_admin(),
        ),
        Cancelled => {
            let pharmacy_may_cancel = is_routed_pharmacy && from != SentToPharmacy && from != Issued;
            (
                Action::CancelPrescription,
                is_issuing_doctor || pharmacy_may_cancel || actor.is_admin(),
            )
        }
        _ => (Action::ProcessPrescription, is_routed_pharmacy),
    };

    authorization::require(actor, action)?;
    if allowed {
        Ok(())
    } else {
        Err(AuthorizationError::Forbidden {
            role: actor.role,
            action: action.as_str(),
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Issue
// ═══════════════════════════════════════════════════════════

pub fn issue(conn: &Connection, doctor: &User, req: IssueRequest) -> Result<PrescriptionDetail, PrescriptionError> {
    authorization::require(doctor, Action::IssuePrescription)?;
    if doctor.role != Role::Doctor {
        return Err(AuthorizationError::Forbidden {
            role: doctor.role,
            action: Action::IssuePrescription.as_str(),
        }
        .into());
    }
    if req.medications.is_empty() {
        return Err(PrescriptionError::NoMedications);
    }
    for med in &req.medications {
        validate_medication(med)?;
    }

    let tx = db::immediate_transaction(conn)?;
    let appt = match repository::get_appointment(&tx, &req.appointment_id)? {
        Some(appt) if appt.doctor_id == doctor.id => appt,
        _ => return Err(PrescriptionError::AppointmentNotFound),
    };
    if !matches!(appt.status, AppointmentStatus::Confirmed | AppointmentStatus::Completed) {
        return Err(PrescriptionError::AppointmentNotEligible(appt.status));
    }

    let now = db::now();
    let rx = Prescription {
        id: Uuid::new_v4(),
        appointment_id: appt.id,
        patient_id: appt.patient_id,
        doctor_id: doctor.id,
        pharmacy_id: None,
        status: PrescriptionStatus::Issued,
        diagnosis: clean(req.diagnosis),
        notes: clean(req.notes),
        version: 0,
        stock_reserved: false,
        issued_at: now,
        updated_at: now,
    };
    repository::insert_prescription(&tx, &rx)?;
    for med in req.medications {
        repository::insert_prescription_medication(
            &tx,
            &PrescriptionMedication {
                id: Uuid::new_v4(),
                prescription_id: rx.id,
                medication_name: med.medication_name.trim().to_string(),
                dosage: med.dosage.trim().to_string(),
                frequency: med.frequency.trim().to_string(),
                duration: med.duration.trim().to_string(),
                quantity: med.quantity,
                instructions: clean(med.instructions),
            },
        )?;
    }
    repository::insert_prescription_event(&tx, &rx.id, None, PrescriptionStatus::Issued, &doctor.id, None, &now)?;

    notifications::notify(
        &tx,
        &rx.patient_id,
        NotificationKind::Prescription,
        "New prescription",
        &format!("Dr. {} issued you a prescription", doctor.full_name),
        Some(link(&rx.id)),
    )?;

    if let Some(pharmacy_id) = req.pharmacy_id {
        ensure_pharmacy(&tx, &pharmacy_id)?;
        apply_transition(&tx, doctor, rx.clone(), PrescriptionStatus::SentToPharmacy, None, Some(pharmacy_id))?;
    }

    let detail = load_detail(&tx, &rx.id)?;
    tx.commit().map_err(DatabaseError::from)?;
    tracing::info!(
        prescription_id = %rx.id,
        doctor_id = %doctor.id,
        medications = detail.medications.len(),
        "Prescription issued"
    );
    Ok(detail)
}

fn validate_medication(med: &MedicationInput) -> Result<(), PrescriptionError> {
    for (field, value) in [
        ("medication_name", &med.medication_name),
        ("dosage", &med.dosage),
        ("frequency", &med.frequency),
        ("duration", &med.duration),
    ] {
        if value.trim().is_empty() {
            return Err(PrescriptionError::InvalidMedication(format!("{field} is required")));
        }
    }
    if med.quantity <= 0 || med.quantity > inventory::MAX_QUANTITY {
        return Err(PrescriptionError::InvalidMedication(format!(
            "quantity for {} must be between 1 and {}",
            med.medication_name.trim(),
            inventory::MAX_QUANTITY
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Transitions
// ═══════════════════════════════════════════════════════════

/// Move a prescription to `target`. `pharmacy_id` is only consulted when
/// sending to a pharmacy.
pub fn transition(
    conn: &Connection,
    actor: &User,
    id: &Uuid,
    target: PrescriptionStatus,
    note: Option<&str>,
    pharmacy_id: Option<Uuid>,
) -> Result<Prescription, PrescriptionError> {
    let tx = db::immediate_transaction(conn)?;
    let rx = visible_prescription(&tx, actor, id)?;
    if let Some(pharmacy_id) = pharmacy_id.filter(|_| target == PrescriptionStatus::SentToPharmacy) {
        ensure_pharmacy(&tx, &pharmacy_id)?;
    }
    let updated = apply_transition(&tx, actor, rx, target, note, pharmacy_id)?;
    tx.commit().map_err(DatabaseError::from)?;
    Ok(updated)
}

/// Send an ISSUED prescription to `pharmacy_id`.
pub fn route_to_pharmacy(
    conn: &Connection,
    actor: &User,
    id: &Uuid,
    pharmacy_id: Uuid,
) -> Result<Prescription, PrescriptionError> {
    transition(
        conn,
        actor,
        id,
        PrescriptionStatus::SentToPharmacy,
        None,
        Some(pharmacy_id),
    )
}

/// Validate, compare-and-set, move stock, record history and notify.
/// Runs on the caller's transaction.
fn apply_transition(
    conn: &Connection,
    actor: &User,
    rx: Prescription,
    target: PrescriptionStatus,
    note: Option<&str>,
    pharmacy_id: Option<Uuid>,
) -> Result<Prescription, PrescriptionError> {
    let from = rx.status;
    if !is_valid_transition(from, target) {
        return Err(PrescriptionError::InvalidTransition { from, to: target });
    }
    authorize_move(actor, &rx, from, target)?;

    let mut update = StatusUpdate::default();
    if target == PrescriptionStatus::SentToPharmacy {
        let chosen = pharmacy_id.or(rx.pharmacy_id).ok_or(PrescriptionError::PharmacyRequired)?;
        update.pharmacy_id = Some(chosen);
    }

    let now = db::now();
    if !repository::compare_and_set_prescription_status(conn, &rx.id, from, rx.version, target, &update, &now)? {
        tracing::debug!(prescription_id = %rx.id, from = from.as_str(), "Lost compare-and-set race");
        return Err(PrescriptionError::Conflict);
    }

    // Stock moves after the CAS so a losing request never touches inventory.
    let routed_pharmacy = update.pharmacy_id.or(rx.pharmacy_id);
    match (target, routed_pharmacy) {
        (PrescriptionStatus::Processing, Some(pharmacy)) => {
            let meds = repository::get_prescription_medications(conn, &rx.id)?;
            inventory::reserve(conn, &pharmacy, &meds)?;
            repository::set_prescription_stock_reserved(conn, &rx.id, true)?;
        }
        (PrescriptionStatus::Cancelled, Some(pharmacy)) if rx.stock_reserved => {
            let meds = repository::get_prescription_medications(conn, &rx.id)?;
            inventory::release(conn, &pharmacy, &meds)?;
            repository::set_prescription_stock_reserved(conn, &rx.id, false)?;
        }
        _ => {}
    }

    let note = note.map(str::trim).filter(|n| !n.is_empty());
    repository::insert_prescription_event(conn, &rx.id, Some(from), target, &actor.id, note, &now)?;

    let updated = repository::get_prescription(conn, &rx.id)?.ok_or(PrescriptionError::NotFound)?;
    notify_parties(conn, actor, &updated)?;

    tracing::info!(
        prescription_id = %rx.id,
        from = from.as_str(),
        to = target.as_str(),
        actor_id = %actor.id,
        "Prescription status changed"
    );
    Ok(updated)
}

/// The patient hears about every change they did not make. The doctor
/// hears about pharmacy-side changes; the pharmacy about being routed to
/// and about cancellations it did not make.
fn notify_parties(conn: &Connection, actor: &User, rx: &Prescription) -> Result<(), DatabaseError> {
    let status = rx.status;
    let message = format!("Your prescription is now {}", status.label());
    let link = link(&rx.id);

    if actor.id != rx.patient_id {
        notifications::notify(conn, &rx.patient_id, NotificationKind::Prescription, "Prescription update", &message, Some(link.clone()))?;
    }
    if actor.role == Role::Pharmacy && actor.id != rx.doctor_id {
        notifications::notify(
            conn,
            &rx.doctor_id,
            NotificationKind::Prescription,
            "Prescription update",
            &format!("{} marked a prescription as {}", actor.display_name(), status.label()),
            Some(link.clone()),
        )?;
    }
    if let Some(pharmacy) = rx.pharmacy_id.filter(|p| *p != actor.id) {
        let title = match status {
            PrescriptionStatus::SentToPharmacy => Some("New prescription received"),
            PrescriptionStatus::Cancelled => Some("Prescription cancelled"),
            _ => None,
        };
        if let Some(title) = title {
            notifications::notify(
                conn,
                &pharmacy,
                NotificationKind::Prescription,
                title,
                &format!("A prescription is now {}", status.label()),
                Some(link),
            )?;
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════

/// Prescriptions visible to `user`, narrowed by `filter`.
pub fn list_for(
    conn: &Connection,
    user: &User,
    mut filter: PrescriptionFilter,
) -> Result<Vec<Prescription>, PrescriptionError> {
    match user.role {
        Role::Patient => filter.patient_id = Some(user.id),
        Role::Doctor => filter.doctor_id = Some(user.id),
        Role::Pharmacy => filter.pharmacy_id = Some(user.id),
        Role::Admin => {}
    }
    Ok(repository::list_prescriptions(conn, &filter)?)
}

pub fn get_detail(conn: &Connection, user: &User, id: &Uuid) -> Result<PrescriptionDetail, PrescriptionError> {
    visible_prescription(conn, user, id)?;
    load_detail(conn, id)
}

/// Load a prescription the user may see. Others get `NotFound`.
fn visible_prescription(conn: &Connection, user: &User, id: &Uuid) -> Result<Prescription, PrescriptionError> {
    let rx = repository::get_prescription(conn, id)?.ok_or(PrescriptionError::NotFound)?;
    if authorization::can_view_prescription(user, &rx).allowed {
        Ok(rx)
    } else {
        Err(PrescriptionError::NotFound)
    }
}

fn load_detail(conn: &Connection, id: &Uuid) -> Result<PrescriptionDetail, PrescriptionError> {
    let prescription = repository::get_prescription(conn, id)?.ok_or(PrescriptionError::NotFound)?;
    Ok(PrescriptionDetail {
        medications: repository::get_prescription_medications(conn, id)?,
        events: repository::get_prescription_events(conn, id)?,
        prescription,
    })
}

fn ensure_pharmacy(conn: &Connection, pharmacy_id: &Uuid) -> Result<(), PrescriptionError> {
    match repository::get_user(conn, pharmacy_id)? {
        Some(user) if user.role == Role::Pharmacy && user.is_active => Ok(()),
        _ => Err(PrescriptionError::PharmacyUnavailable),
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn link(id: &Uuid) -> String {
    format!("/prescriptions/{id}")
}
