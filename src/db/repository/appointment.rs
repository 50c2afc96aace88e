use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{fmt_ts, parse_ts, parse_uuid, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

const APPOINTMENT_COLUMNS: &str = "id, patient_id, doctor_id, scheduled_at, duration_minutes, mode,
     status, reason, notes, meeting_link, created_at, updated_at";

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, patient_id, doctor_id, scheduled_at, duration_minutes, mode,
         status, reason, notes, meeting_link, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            appt.id.to_string(),
            appt.patient_id.to_string(),
            appt.doctor_id.to_string(),
            fmt_ts(&appt.scheduled_at),
            appt.duration_minutes,
            appt.mode.as_str(),
            appt.status.as_str(),
            appt.reason,
            appt.notes,
            appt.meeting_link,
            fmt_ts(&appt.created_at),
            fmt_ts(&appt.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
        params![id.to_string()],
        appointment_row_from_rusqlite,
    )
    .optional()?
    .map(appointment_from_row)
    .transpose()
}

pub fn list_appointments(
    conn: &Connection,
    filter: &AppointmentFilter,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE 1=1");
    let mut values: Vec<String> = Vec::new();

    if let Some(status) = &filter.status {
        values.push(status.as_str().to_string());
        sql.push_str(&format!(" AND status = ?{}", values.len()));
    }
    if let Some(doctor) = &filter.doctor_id {
        values.push(doctor.to_string());
        sql.push_str(&format!(" AND doctor_id = ?{}", values.len()));
    }
    if let Some(patient) = &filter.patient_id {
        values.push(patient.to_string());
        sql.push_str(&format!(" AND patient_id = ?{}", values.len()));
    }
    if let Some(from) = &filter.date_from {
        values.push(format!("{from} 00:00:00"));
        sql.push_str(&format!(" AND scheduled_at >= ?{}", values.len()));
    }
    if let Some(to) = &filter.date_to {
        values.push(format!("{to} 23:59:59"));
        sql.push_str(&format!(" AND scheduled_at <= ?{}", values.len()));
    }
    sql.push_str(" ORDER BY scheduled_at ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(values.iter()),
        appointment_row_from_rusqlite,
    )?;

    let mut appts = Vec::new();
    for row in rows {
        appts.push(appointment_from_row(row?)?);
    }
    Ok(appts)
}

/// Active (pending/confirmed) appointments for a participant that start
/// inside `[window_start, window_end)`. Callers widen the window by the
/// longest allowed duration and do the exact overlap test in Rust.
pub fn list_active_in_window(
    conn: &Connection,
    participant_column: ParticipantColumn,
    user_id: &Uuid,
    window_start: &NaiveDateTime,
    window_end: &NaiveDateTime,
) -> Result<Vec<Appointment>, DatabaseError> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE {} = ?1 AND status IN ('PENDING', 'CONFIRMED')
           AND scheduled_at >= ?2 AND scheduled_at < ?3
         ORDER BY scheduled_at ASC",
        participant_column.as_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![user_id.to_string(), fmt_ts(window_start), fmt_ts(window_end)],
        appointment_row_from_rusqlite,
    )?;

    let mut appts = Vec::new();
    for row in rows {
        appts.push(appointment_from_row(row?)?);
    }
    Ok(appts)
}

#[derive(Debug, Clone, Copy)]
pub enum ParticipantColumn {
    Doctor,
    Patient,
}

impl ParticipantColumn {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Doctor => "doctor_id",
            Self::Patient => "patient_id",
        }
    }
}

/// Compare-and-set status update. Returns `false` when the row is no
/// longer in `expected` (another request moved it first).
pub fn update_appointment_status(
    conn: &Connection,
    id: &Uuid,
    expected: AppointmentStatus,
    new_status: AppointmentStatus,
    updated_at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        params![
            id.to_string(),
            expected.as_str(),
            new_status.as_str(),
            fmt_ts(updated_at)
        ],
    )?;
    Ok(changed == 1)
}

pub fn update_appointment_schedule(
    conn: &Connection,
    id: &Uuid,
    expected: AppointmentStatus,
    scheduled_at: &NaiveDateTime,
    updated_at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments SET scheduled_at = ?3, status = 'PENDING', updated_at = ?4
         WHERE id = ?1 AND status = ?2",
        params![
            id.to_string(),
            expected.as_str(),
            fmt_ts(scheduled_at),
            fmt_ts(updated_at)
        ],
    )?;
    Ok(changed == 1)
}

pub fn update_appointment_notes(
    conn: &Connection,
    id: &Uuid,
    notes: &str,
    updated_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments SET notes = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), notes, fmt_ts(updated_at)],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Appointment", id));
    }
    Ok(())
}

pub fn count_appointments_by_status(
    conn: &Connection,
) -> Result<Vec<(AppointmentStatus, i64)>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT status, COUNT(*) FROM appointments GROUP BY status ORDER BY status")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = Vec::new();
    for row in rows {
        let (status, count) = row?;
        counts.push((AppointmentStatus::from_str(&status)?, count));
    }
    Ok(counts)
}

struct AppointmentRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    scheduled_at: String,
    duration_minutes: i64,
    mode: String,
    status: String,
    reason: Option<String>,
    notes: Option<String>,
    meeting_link: Option<String>,
    created_at: String,
    updated_at: String,
}

fn appointment_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<AppointmentRow, rusqlite::Error> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        scheduled_at: row.get(3)?,
        duration_minutes: row.get(4)?,
        mode: row.get(5)?,
        status: row.get(6)?,
        reason: row.get(7)?,
        notes: row.get(8)?,
        meeting_link: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn appointment_from_row(row: AppointmentRow) -> Result<Appointment, DatabaseError> {
    Ok(Appointment {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        doctor_id: parse_uuid(&row.doctor_id)?,
        scheduled_at: parse_ts(&row.scheduled_at)?,
        duration_minutes: row.duration_minutes,
        mode: AppointmentMode::from_str(&row.mode)?,
        status: AppointmentStatus::from_str(&row.status)?,
        reason: row.reason,
        notes: row.notes,
        meeting_link: row.meeting_link,
        created_at: parse_ts(&row.created_at)?,
        updated_at: parse_ts(&row.updated_at)?,
    })
}
