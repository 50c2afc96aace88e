use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{fmt_ts, parse_date, parse_ts, parse_uuid, DatabaseError};
use crate::models::*;
use chrono::NaiveDateTime;

const INVENTORY_COLUMNS: &str = "id, pharmacy_id, medication_name, quantity, unit, reorder_level,
     unit_price_cents, expiry_date, updated_at";

pub fn insert_inventory_item(conn: &Connection, item: &InventoryItem) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO pharmacy_inventory (id, pharmacy_id, medication_name, quantity, unit,
         reorder_level, unit_price_cents, expiry_date, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            item.id.to_string(),
            item.pharmacy_id.to_string(),
            item.medication_name,
            item.quantity,
            item.unit,
            item.reorder_level,
            item.unit_price_cents,
            item.expiry_date.map(|d| d.to_string()),
            fmt_ts(&item.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_inventory_item(conn: &Connection, id: &Uuid) -> Result<Option<InventoryItem>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {INVENTORY_COLUMNS} FROM pharmacy_inventory WHERE id = ?1"),
        params![id.to_string()],
        inventory_row_from_rusqlite,
    )
    .optional()?
    .map(inventory_from_row)
    .transpose()
}

/// Case-insensitive lookup of a medication on one pharmacy's shelf.
pub fn find_inventory_item_by_name(
    conn: &Connection,
    pharmacy_id: &Uuid,
    medication_name: &str,
) -> Result<Option<InventoryItem>, DatabaseError> {
    conn.query_row(
        &format!(
            "SELECT {INVENTORY_COLUMNS} FROM pharmacy_inventory
             WHERE pharmacy_id = ?1 AND lower(medication_name) = lower(?2)"
        ),
        params![pharmacy_id.to_string(), medication_name.trim()],
        inventory_row_from_rusqlite,
    )
    .optional()?
    .map(inventory_from_row)
    .transpose()
}

pub fn list_inventory_items(
    conn: &Connection,
    pharmacy_id: &Uuid,
    low_stock_only: bool,
) -> Result<Vec<InventoryItem>, DatabaseError> {
    let sql = format!(
        "SELECT {INVENTORY_COLUMNS} FROM pharmacy_inventory
         WHERE pharmacy_id = ?1 {}
         ORDER BY medication_name COLLATE NOCASE",
        if low_stock_only { "AND quantity <= reorder_level" } else { "" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![pharmacy_id.to_string()], inventory_row_from_rusqlite)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(inventory_from_row(row?)?);
    }
    Ok(items)
}

pub fn update_inventory_item(conn: &Connection, item: &InventoryItem) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE pharmacy_inventory SET medication_name = ?2, quantity = ?3, unit = ?4,
         reorder_level = ?5, unit_price_cents = ?6, expiry_date = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            item.id.to_string(),
            item.medication_name,
            item.quantity,
            item.unit,
            item.reorder_level,
            item.unit_price_cents,
            item.expiry_date.map(|d| d.to_string()),
            fmt_ts(&item.updated_at),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("InventoryItem", item.id));
    }
    Ok(())
}

/// Apply a signed quantity change, refusing to go below zero.
/// Returns `false` (and changes nothing) when stock is insufficient.
pub fn apply_inventory_delta(
    conn: &Connection,
    id: &Uuid,
    delta: i64,
    updated_at: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE pharmacy_inventory SET quantity = quantity + ?2, updated_at = ?3
         WHERE id = ?1 AND quantity + ?2 >= 0",
        params![id.to_string(), delta, fmt_ts(updated_at)],
    )?;
    Ok(changed == 1)
}

pub fn delete_inventory_item(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM pharmacy_inventory WHERE id = ?1",
        params![id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("InventoryItem", id));
    }
    Ok(())
}

pub fn count_low_stock_items(conn: &Connection, pharmacy_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM pharmacy_inventory WHERE pharmacy_id = ?1 AND quantity <= reorder_level",
        params![pharmacy_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

struct InventoryRow {
    id: String,
    pharmacy_id: String,
    medication_name: String,
    quantity: i64,
    unit: String,
    reorder_level: i64,
    unit_price_cents: i64,
    expiry_date: Option<String>,
    updated_at: String,
}

fn inventory_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<InventoryRow, rusqlite::Error> {
    Ok(InventoryRow {
        id: row.get(0)?,
        pharmacy_id: row.get(1)?,
        medication_name: row.get(2)?,
        quantity: row.get(3)?,
        unit: row.get(4)?,
        reorder_level: row.get(5)?,
        unit_price_cents: row.get(6)?,
        expiry_date: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn inventory_from_row(row: InventoryRow) -> Result<InventoryItem, DatabaseError> {
    Ok(InventoryItem {
        id: parse_uuid(&row.id)?,
        pharmacy_id: parse_uuid(&row.pharmacy_id)?,
        medication_name: row.medication_name,
        quantity: row.quantity,
        unit: row.unit,
        reorder_level: row.reorder_level,
        unit_price_cents: row.unit_price_cents,
        expiry_date: row.expiry_date.as_deref().and_then(parse_date),
        updated_at: parse_ts(&row.updated_at)?,
    })
}
