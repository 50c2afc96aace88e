//! Read-only medication views joined across inventory and prescriptions.

use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{parse_ts, parse_uuid, DatabaseError};
use crate::models::enums::PrescriptionStatus;
use crate::models::*;

/// Stocked medications matching `query` (case-insensitive substring),
/// grouped by lowercased name.
pub fn search_medication_catalog(
    conn: &Connection,
    query: Option<&str>,
    limit: u32,
) -> Result<Vec<MedicationAvailability>, DatabaseError> {
    let pattern = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| super::contains_pattern(&q.to_lowercase()));
    let mut stmt = conn.prepare(
        "SELECT MIN(i.medication_name),
                COUNT(DISTINCT CASE WHEN i.quantity > 0 THEN i.pharmacy_id END),
                SUM(i.quantity),
                MIN(CASE WHEN i.quantity > 0 THEN i.unit_price_cents END)
         FROM pharmacy_inventory i
         JOIN users u ON u.id = i.pharmacy_id AND u.is_active = 1
         WHERE ?1 IS NULL OR lower(i.medication_name) LIKE ?1 ESCAPE '\\'
         GROUP BY lower(i.medication_name)
         ORDER BY lower(i.medication_name)
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![pattern, limit], |row| {
        Ok(MedicationAvailability {
            medication_name: row.get(0)?,
            pharmacies: row.get(1)?,
            total_quantity: row.get(2)?,
            lowest_price_cents: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}


/// Active pharmacies holding at least `min_quantity` of the medication.
pub fn list_pharmacies_stocking(
    conn: &Connection,
    medication_name: &str,
    min_quantity: i64,
) -> Result<Vec<PharmacyStock>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, COALESCE(u.pharmacy_name, u.full_name), u.address,
                i.quantity, i.unit, i.unit_price_cents
         FROM pharmacy_inventory i
         JOIN users u ON u.id = i.pharmacy_id
         WHERE lower(i.medication_name) = lower(?1)
           AND i.quantity >= ?2 AND u.is_active = 1 AND u.role = 'PHARMACY'
         ORDER BY i.unit_price_cents ASC, i.quantity DESC",
    )?;
    let rows = stmt.query_map(params![medication_name.trim(), min_quantity], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, i64>(5)?,
        ))
    })?;

    let mut stocks = Vec::new();
    for row in rows {
        let (id, pharmacy_name, address, quantity, unit, unit_price_cents) = row?;
        stocks.push(PharmacyStock {
            pharmacy_id: parse_uuid(&id)?,
            pharmacy_name,
            address,
            quantity,
            unit,
            unit_price_cents,
        });
    }
    Ok(stocks)
}

/// Every medication line prescribed to the patient, newest first.
/// With `active_only`, completed and cancelled prescriptions are skipped.
pub fn list_patient_medications(
    conn: &Connection,
    patient_id: &Uuid,
    active_only: bool,
) -> Result<Vec<PatientMedication>, DatabaseError> {
    let sql = format!(
        "SELECT p.id, p.status, m.medication_name, m.dosage, m.frequency, m.duration,
                m.quantity, m.instructions, d.full_name, p.issued_at
         FROM prescription_medications m
         JOIN prescriptions p ON p.id = m.prescription_id
         JOIN users d ON d.id = p.doctor_id
         WHERE p.patient_id = ?1 {}
         ORDER BY p.issued_at DESC, m.rowid ASC",
        if active_only {
            "AND p.status NOT IN ('COMPLETED', 'CANCELLED')"
        } else {
            ""
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, i64>(6)?,
            row.get::<_, Option<String>>(7)?,
            row.get::<_, String>(8)?,
            row.get::<_, String>(9)?,
        ))
    })?;

    let mut meds = Vec::new();
    for row in rows {
        let (rx_id, status, medication_name, dosage, frequency, duration, quantity, instructions, prescriber, issued_at) =
            row?;
        meds.push(PatientMedication {
            prescription_id: parse_uuid(&rx_id)?,
            prescription_status: PrescriptionStatus::from_str(&status)?,
            medication_name,
            dosage,
            frequency,
            duration,
            quantity,
            instructions,
            prescriber_name: prescriber,
            issued_at: parse_ts(&issued_at)?,
        });
    }
    Ok(meds)
}
