use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{fmt_ts, parse_ts, parse_uuid, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

const PRESCRIPTION_COLUMNS: &str = "id, appointment_id, patient_id, doctor_id, pharmacy_id, status,
     diagnosis, notes, version, stock_reserved, issued_at, updated_at";

pub fn insert_prescription(conn: &Connection, rx: &Prescription) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescriptions (id, appointment_id, patient_id, doctor_id, pharmacy_id, status,
         diagnosis, notes, version, stock_reserved, issued_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            rx.id.to_string(),
            rx.appointment_id.to_string(),
            rx.patient_id.to_string(),
            rx.doctor_id.to_string(),
            rx.pharmacy_id.map(|id| id.to_string()),
            rx.status.as_str(),
            rx.diagnosis,
            rx.notes,
            rx.version,
            rx.stock_reserved as i32,
            fmt_ts(&rx.issued_at),
            fmt_ts(&rx.updated_at),
        ],
    )?;
    Ok(())
}

pub fn insert_prescription_medication(
    conn: &Connection,
    med: &PrescriptionMedication,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescription_medications (id, prescription_id, medication_name, dosage,
         frequency, duration, quantity, instructions)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            med.id.to_string(),
            med.prescription_id.to_string(),
            med.medication_name,
            med.dosage,
            med.frequency,
            med.duration,
            med.quantity,
            med.instructions,
        ],
    )?;
    Ok(())
}

pub fn get_prescription(conn: &Connection, id: &Uuid) -> Result<Option<Prescription>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?1"),
        params![id.to_string()],
        prescription_row_from_rusqlite,
    )
    .optional()?
    .map(prescription_from_row)
    .transpose()
}

pub fn list_prescriptions(
    conn: &Connection,
    filter: &PrescriptionFilter,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut sql = format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE 1=1");
    let mut values: Vec<String> = Vec::new();

    if let Some(status) = &filter.status {
        values.push(status.as_str().to_string());
        sql.push_str(&format!(" AND status = ?{}", values.len()));
    }
    if let Some(patient) = &filter.patient_id {
        values.push(patient.to_string());
        sql.push_str(&format!(" AND patient_id = ?{}", values.len()));
    }
    if let Some(doctor) = &filter.doctor_id {
        values.push(doctor.to_string());
        sql.push_str(&format!(" AND doctor_id = ?{}", values.len()));
    }
    if let Some(pharmacy) = &filter.pharmacy_id {
        values.push(pharmacy.to_string());
        sql.push_str(&format!(" AND pharmacy_id = ?{}", values.len()));
    }
    sql.push_str(" ORDER BY issued_at DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(values.iter()),
        prescription_row_from_rusqlite,
    )?;

    let mut list = Vec::new();
    for row in rows {
        list.push(prescription_from_row(row?)?);
    }
    Ok(list)
}

pub fn get_prescription_medications(
    conn: &Connection,
    prescription_id: &Uuid,
) -> Result<Vec<PrescriptionMedication>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, prescription_id, medication_name, dosage, frequency, duration, quantity, instructions
         FROM prescription_medications WHERE prescription_id = ?1 ORDER BY rowid",
    )?;

    let rows = stmt.query_map(params![prescription_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, i64>(6)?,
            row.get::<_, Option<String>>(7)?,
        ))
    })?;

    let mut meds = Vec::new();
    for row in rows {
        let (id, rx_id, medication_name, dosage, frequency, duration, quantity, instructions) = row?;
        meds.push(PrescriptionMedication {
            id: parse_uuid(&id)?,
            prescription_id: parse_uuid(&rx_id)?,
            medication_name,
            dosage,
            frequency,
            duration,
            quantity,
            instructions,
        });
    }
    Ok(meds)
}

/// Field changes applied together with a status move.
#[derive(Debug, Default)]
pub struct StatusUpdate {
    pub pharmacy_id: Option<Uuid>,
    pub stock_reserved: Option<bool>,
}

/// Compare-and-set on `(status, version)`. Bumps the version and returns
/// `false` if the row moved since the caller read it.
pub fn compare_and_set_prescription_status(
    conn: &Connection,
    id: &Uuid,
    expected_status: PrescriptionStatus,
    expected_version: i64,
    new_status: PrescriptionStatus,
    update: &StatusUpdate,
    updated_at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescriptions
         SET status = ?4,
             version = version + 1,
             pharmacy_id = COALESCE(?5, pharmacy_id),
             stock_reserved = COALESCE(?6, stock_reserved),
             updated_at = ?7
         WHERE id = ?1 AND status = ?2 AND version = ?3",
        params![
            id.to_string(),
            expected_status.as_str(),
            expected_version,
            new_status.as_str(),
            update.pharmacy_id.map(|p| p.to_string()),
            update.stock_reserved.map(|b| b as i32),
            fmt_ts(updated_at),
        ],
    )?;
    Ok(changed == 1)
}

/// Flag whether pharmacy stock is currently held for this prescription.
pub fn set_prescription_stock_reserved(
    conn: &Connection,
    id: &Uuid,
    reserved: bool,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescriptions SET stock_reserved = ?2 WHERE id = ?1",
        params![id.to_string(), reserved as i32],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Prescription", id));
    }
    Ok(())
}

pub fn insert_prescription_event(
    conn: &Connection,
    prescription_id: &Uuid,
    from_status: Option<PrescriptionStatus>,
    to_status: PrescriptionStatus,
    actor_id: &Uuid,
    note: Option<&str>,
    created_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescription_events (prescription_id, from_status, to_status, actor_id, note, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            prescription_id.to_string(),
            from_status.map(|s| s.as_str()),
            to_status.as_str(),
            actor_id.to_string(),
            note,
            fmt_ts(created_at),
        ],
    )?;
    Ok(())
}

pub fn get_prescription_events(
    conn: &Connection,
    prescription_id: &Uuid,
) -> Result<Vec<PrescriptionEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, prescription_id, from_status, to_status, actor_id, note, created_at
         FROM prescription_events WHERE prescription_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![prescription_id.to_string()], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (id, rx_id, from_status, to_status, actor_id, note, created_at) = row?;
        events.push(PrescriptionEvent {
            id,
            prescription_id: parse_uuid(&rx_id)?,
            from_status: from_status
                .as_deref()
                .map(PrescriptionStatus::from_str)
                .transpose()?,
            to_status: PrescriptionStatus::from_str(&to_status)?,
            actor_id: parse_uuid(&actor_id)?,
            note,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(events)
}

pub fn count_prescriptions_by_status(
    conn: &Connection,
    pharmacy_id: Option<&Uuid>,
) -> Result<Vec<(PrescriptionStatus, i64)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM prescriptions
         WHERE ?1 IS NULL OR pharmacy_id = ?1
         GROUP BY status ORDER BY status",
    )?;
    let rows = stmt.query_map(params![pharmacy_id.map(|p| p.to_string())], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = Vec::new();
    for row in rows {
        let (status, count) = row?;
        counts.push((PrescriptionStatus::from_str(&status)?, count));
    }
    Ok(counts)
}

/// Prescriptions a doctor issued at or after `since`.
pub fn count_prescriptions_issued_since(
    conn: &Connection,
    doctor_id: &Uuid,
    since: &NaiveDateTime,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM prescriptions WHERE doctor_id = ?1 AND issued_at >= ?2",
        params![doctor_id.to_string(), fmt_ts(since)],
        |row| row.get(0),
    )?;
    Ok(count)
}

struct PrescriptionRow {
    id: String,
    appointment_id: String,
    patient_id: String,
    doctor_id: String,
    pharmacy_id: Option<String>,
    status: String,
    diagnosis: Option<String>,
    notes: Option<String>,
    version: i64,
    stock_reserved: i32,
    issued_at: String,
    updated_at: String,
}

fn prescription_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PrescriptionRow, rusqlite::Error> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        appointment_id: row.get(1)?,
        patient_id: row.get(2)?,
        doctor_id: row.get(3)?,
        pharmacy_id: row.get(4)?,
        status: row.get(5)?,
        diagnosis: row.get(6)?,
        notes: row.get(7)?,
        version: row.get(8)?,
        stock_reserved: row.get(9)?,
        issued_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn prescription_from_row(row: PrescriptionRow) -> Result<Prescription, DatabaseError> {
    Ok(Prescription {
        id: parse_uuid(&row.id)?,
        appointment_id: parse_uuid(&row.appointment_id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        doctor_id: parse_uuid(&row.doctor_id)?,
        pharmacy_id: row.pharmacy_id.as_deref().map(parse_uuid).transpose()?,
        status: PrescriptionStatus::from_str(&row.status)?,
        diagnosis: row.diagnosis,
        notes: row.notes,
        version: row.version,
        stock_reserved: row.stock_reserved != 0,
        issued_at: parse_ts(&row.issued_at)?,
        updated_at: parse_ts(&row.updated_at)?,
    })
}
