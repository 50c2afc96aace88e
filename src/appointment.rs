//! Appointment scheduling.
//!
//! Patients book; the doctor confirms, completes or marks a no-show;
//! either side may cancel or reschedule while the appointment is still
//! active. A doctor and a patient can never hold two overlapping active
//! appointments (intervals are half-open, so back-to-back is fine).

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{self, Action, AuthorizationError};
use crate::config::{CLINIC_CLOSE_HOUR, CLINIC_OPEN_HOUR, SLOT_MINUTES};
use crate::db::{self, repository, DatabaseError, ParticipantColumn};
use crate::models::enums::{AppointmentMode, AppointmentStatus, NotificationKind, Role};
use crate::models::{Appointment, AppointmentFilter, User};
use crate::notifications;

pub const MIN_DURATION_MINUTES: i64 = SLOT_MINUTES;
pub const MAX_DURATION_MINUTES: i64 = 120;
pub const DEFAULT_DURATION_MINUTES: i64 = 30;

const MEETING_BASE_URL: &str = "https://meet.careflow.local";

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Forbidden(#[from] AuthorizationError),
    #[error("Appointment not found")]
    NotFound,
    #[error("Only patients can book appointments")]
    NotAPatient,
    #[error("Doctor not found or not accepting appointments")]
    DoctorUnavailable,
    #[error("Appointment time must be in the future")]
    InPast,
    #[error("Duration must be a multiple of 30 minutes between 30 and 120, got {0}")]
    InvalidDuration(i64),
    #[error("Appointments start on the hour or half hour")]
    Misaligned,
    #[error("Appointments must fall within clinic hours (09:00-17:00 UTC)")]
    OutsideClinicHours,
    #[error("The doctor already has an appointment at that time")]
    DoctorConflict,
    #[error("You already have an appointment at that time")]
    PatientConflict,
    #[error("Cannot move appointment from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("Appointment was modified concurrently, reload and retry")]
    Conflict,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub doctor_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    pub mode: AppointmentMode,
    #[serde(default)]
    pub reason: Option<String>,
}

/// One bookable slot in a doctor's day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

// ═══════════════════════════════════════════════════════════
// Booking
// ═══════════════════════════════════════════════════════════

pub fn book(conn: &Connection, patient: &User, req: BookingRequest) -> Result<Appointment, AppointmentError> {
    authorization::require(patient, Action::BookAppointment)?;
    if patient.role != Role::Patient {
        return Err(AppointmentError::NotAPatient);
    }

    let duration = req.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
    let now = db::now();
    check_schedule(req.scheduled_at, duration, now)?;

    let tx = db::immediate_transaction(conn)?;

    match repository::get_user(&tx, &req.doctor_id)? {
        Some(doctor) if doctor.role == Role::Doctor && doctor.is_active => {}
        _ => return Err(AppointmentError::DoctorUnavailable),
    }

    let end = req.scheduled_at + Duration::minutes(duration);
    ensure_free(&tx, &req.doctor_id, &patient.id, req.scheduled_at, end, None)?;

    let id = Uuid::new_v4();
    let appt = Appointment {
        id,
        patient_id: patient.id,
        doctor_id: req.doctor_id,
        scheduled_at: req.scheduled_at,
        duration_minutes: duration,
        mode: req.mode,
        status: AppointmentStatus::Pending,
        reason: req.reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
        notes: None,
        meeting_link: (req.mode == AppointmentMode::Online).then(|| format!("{MEETING_BASE_URL}/{id}")),
        created_at: now,
        updated_at: now,
    };
    repository::insert_appointment(&tx, &appt)?;

    notifications::notify(
        &tx,
        &appt.doctor_id,
        NotificationKind::Appointment,
        "New appointment request",
        &format!(
            "{} requested a {} appointment on {}",
            patient.display_name(),
            appt.mode.as_str().to_lowercase(),
            fmt_when(&appt.scheduled_at)
        ),
        Some(link(&appt.id)),
    )?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(appointment_id = %appt.id, doctor_id = %appt.doctor_id, "Appointment booked");
    Ok(appt)
}

/// Reject when either party has an active appointment overlapping
/// `[start, end)`. `ignore` skips the appointment being rescheduled.
fn ensure_free(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
    start: NaiveDateTime,
    end: NaiveDateTime,
    ignore: Option<&Uuid>,
) -> Result<(), AppointmentError> {
    let window_start = start - Duration::minutes(MAX_DURATION_MINUTES);
    let clashes = |column, user_id| -> Result<bool, AppointmentError> {
        Ok(repository::list_active_in_window(conn, column, user_id, &window_start, &end)?
            .iter()
            .filter(|a| Some(&a.id) != ignore)
            .any(|a| a.overlaps(start, end)))
    };

    if clashes(ParticipantColumn::Doctor, doctor_id)? {
        return Err(AppointmentError::DoctorConflict);
    }
    if clashes(ParticipantColumn::Patient, patient_id)? {
        return Err(AppointmentError::PatientConflict);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Status changes
// ═══════════════════════════════════════════════════════════

/// Capability needed for a move, or `None` when the move is not allowed.
fn required_action(from: AppointmentStatus, to: AppointmentStatus) -> Option<Action> {
    use AppointmentStatus::*;
    match (from, to) {
        (Pending, Confirmed) => Some(Action::ConfirmAppointment),
        (Pending | Confirmed, Cancelled) => Some(Action::CancelAppointment),
        (Confirmed, Completed | NoShow) => Some(Action::CompleteAppointment),
        _ => None,
    }
}

pub fn transition(
    conn: &Connection,
    actor: &User,
    id: &Uuid,
    target: AppointmentStatus,
    notes: Option<&str>,
) -> Result<Appointment, AppointmentError> {
    let tx = db::immediate_transaction(conn)?;
    let appt = repository::get_appointment(&tx, id)?.ok_or(AppointmentError::NotFound)?;
    authorization::require_appointment_access(actor, &appt)?;

    let action = required_action(appt.status, target).ok_or(AppointmentError::InvalidTransition {
        from: appt.status,
        to: target,
    })?;
    authorization::require(actor, action)?;

    let now = db::now();
    if !repository::update_appointment_status(&tx, id, appt.status, target, &now)? {
        return Err(AppointmentError::Conflict);
    }
    if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
        repository::update_appointment_notes(&tx, id, notes, &now)?;
    }

    let title = match target {
        AppointmentStatus::Confirmed => "Appointment confirmed",
        AppointmentStatus::Cancelled => "Appointment cancelled",
        AppointmentStatus::Completed => "Appointment completed",
        AppointmentStatus::NoShow => "Appointment marked as no-show",
        AppointmentStatus::Pending => "Appointment updated",
    };
    let message = format!(
        "Your appointment on {} is now {}",
        fmt_when(&appt.scheduled_at),
        target.as_str().to_lowercase().replace('_', " ")
    );
    notify_counterparts(&tx, actor, &appt, title, &message)?;

    let updated = repository::get_appointment(&tx, id)?.ok_or(AppointmentError::NotFound)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        appointment_id = %id,
        from = appt.status.as_str(),
        to = target.as_str(),
        actor_id = %actor.id,
        "Appointment status changed"
    );
    Ok(updated)
}

/// Move an active appointment to a new start time. Conflict rules match
/// booking; the appointment goes back to PENDING for the doctor to confirm.
pub fn reschedule(
    conn: &Connection,
    actor: &User,
    id: &Uuid,
    new_start: NaiveDateTime,
) -> Result<Appointment, AppointmentError> {
    let tx = db::immediate_transaction(conn)?;
    let appt = repository::get_appointment(&tx, id)?.ok_or(AppointmentError::NotFound)?;
    authorization::require_appointment_access(actor, &appt)?;
    authorization::require(actor, Action::RescheduleAppointment)?;

    if !appt.status.is_active() {
        return Err(AppointmentError::InvalidTransition {
            from: appt.status,
            to: AppointmentStatus::Pending,
        });
    }
    let now = db::now();
    check_schedule(new_start, appt.duration_minutes, now)?;
    let end = new_start + Duration::minutes(appt.duration_minutes);
    ensure_free(&tx, &appt.doctor_id, &appt.patient_id, new_start, end, Some(id))?;

    if !repository::update_appointment_schedule(&tx, id, appt.status, &new_start, &now)? {
        return Err(AppointmentError::Conflict);
    }
    notify_counterparts(
        &tx,
        actor,
        &appt,
        "Appointment rescheduled",
        &format!(
            "Appointment moved from {} to {}",
            fmt_when(&appt.scheduled_at),
            fmt_when(&new_start)
        ),
    )?;

    let updated = repository::get_appointment(&tx, id)?.ok_or(AppointmentError::NotFound)?;
    tx.commit().map_err(DatabaseError::from)?;
    tracing::info!(appointment_id = %id, actor_id = %actor.id, "Appointment rescheduled");
    Ok(updated)
}

/// The other participant hears about the change. Admin changes reach both.
fn notify_counterparts(
    conn: &Connection,
    actor: &User,
    appt: &Appointment,
    title: &str,
    message: &str,
) -> Result<(), DatabaseError> {
    for recipient in [appt.patient_id, appt.doctor_id] {
        if recipient != actor.id {
            notifications::notify(
                conn,
                &recipient,
                NotificationKind::Appointment,
                title,
                message,
                Some(link(&appt.id)),
            )?;
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════

/// Appointments visible to `user`, narrowed by `filter`. Patients and
/// doctors only ever see their own.
pub fn list_for(
    conn: &Connection,
    user: &User,
    mut filter: AppointmentFilter,
) -> Result<Vec<Appointment>, AppointmentError> {
    match user.role {
        Role::Patient => filter.patient_id = Some(user.id),
        Role::Doctor => filter.doctor_id = Some(user.id),
        Role::Admin => {}
        Role::Pharmacy => {
            return Err(AuthorizationError::Forbidden {
                role: user.role,
                action: "view_appointments",
            }
            .into())
        }
    }
    Ok(repository::list_appointments(conn, &filter)?)
}

pub fn get_for(conn: &Connection, user: &User, id: &Uuid) -> Result<Appointment, AppointmentError> {
    let appt = repository::get_appointment(conn, id)?.ok_or(AppointmentError::NotFound)?;
    if !authorization::can_view_appointment(user, &appt).allowed {
        // Hide existence from non-participants.
        return Err(AppointmentError::NotFound);
    }
    Ok(appt)
}

/// Free slots for `doctor_id` on `date` within clinic hours. Slots that
/// have already started are omitted.
pub fn doctor_availability(
    conn: &Connection,
    doctor_id: &Uuid,
    date: NaiveDate,
) -> Result<Vec<Slot>, AppointmentError> {
    match repository::get_user(conn, doctor_id)? {
        Some(doctor) if doctor.role == Role::Doctor && doctor.is_active => {}
        _ => return Err(AppointmentError::DoctorUnavailable),
    }
    let (Some(open), Some(close)) = (
        date.and_hms_opt(CLINIC_OPEN_HOUR, 0, 0),
        date.and_hms_opt(CLINIC_CLOSE_HOUR, 0, 0),
    ) else {
        return Ok(Vec::new());
    };

    let booked = repository::list_active_in_window(
        conn,
        ParticipantColumn::Doctor,
        doctor_id,
        &(open - Duration::minutes(MAX_DURATION_MINUTES)),
        &close,
    )?;
    let now = db::now();
    let step = Duration::minutes(SLOT_MINUTES);

    let mut slots = Vec::new();
    let mut start = open;
    while start + step <= close {
        let end = start + step;
        if start > now && !booked.iter().any(|a| a.overlaps(start, end)) {
            slots.push(Slot { start, end });
        }
        start = end;
    }
    Ok(slots)
}

/// In the future, slot-aligned and inside clinic hours.
fn check_schedule(start: NaiveDateTime, duration: i64, now: NaiveDateTime) -> Result<(), AppointmentError> {
    if start <= now {
        return Err(AppointmentError::InPast);
    }
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration) || duration % SLOT_MINUTES != 0 {
        return Err(AppointmentError::InvalidDuration(duration));
    }
    if start.second() != 0 || i64::from(start.minute()) % SLOT_MINUTES != 0 {
        return Err(AppointmentError::Misaligned);
    }
    let date = start.date();
    let (Some(open), Some(close)) = (
        date.and_hms_opt(CLINIC_OPEN_HOUR, 0, 0),
        date.and_hms_opt(CLINIC_CLOSE_HOUR, 0, 0),
    ) else {
        return Err(AppointmentError::OutsideClinicHours);
    };
    match start.checked_add_signed(Duration::minutes(duration)) {
        Some(end) if start >= open && end <= close => Ok(()),
        _ => Err(AppointmentError::OutsideClinicHours),
    }
}

fn link(id: &Uuid) -> String {
    format!("/appointments/{id}")
}

fn fmt_when(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}
