//! Pharmacy stock.
//!
//! Each pharmacy owns its shelf. Quantities never go negative; stock is
//! reserved when a prescription enters PROCESSING and released when a
//! reserved prescription is cancelled. Dropping to or below the reorder
//! level raises one warning per crossing: a system alert for admins and
//! an inventory notification for the pharmacy.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::authorization::{self, Action, AuthorizationError};
use crate::db::{self, repository, DatabaseError};
use crate::models::enums::{AlertSeverity, NotificationKind, Role};
use crate::models::{InventoryItem, PrescriptionMedication, User};
use crate::notifications;
use crate::system_alerts::{self, SystemAlertError};

/// Upper bound for any single shelf quantity or reorder level.
pub const MAX_QUANTITY: i64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Forbidden(#[from] AuthorizationError),
    #[error(transparent)]
    Alert(#[from] SystemAlertError),
    #[error("Inventory item not found")]
    NotFound,
    #[error("Only pharmacy accounts hold inventory")]
    NotAPharmacy,
    #[error("{0}")]
    Validation(String),
    #[error("{0} is already stocked")]
    Duplicate(String),
    #[error("Insufficient stock for {medication}: {available} available, {requested} requested")]
    InsufficientStock {
        medication: String,
        available: i64,
        requested: i64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInventoryItem {
    pub medication_name: String,
    pub quantity: i64,
    pub unit: String,
    #[serde(default)]
    pub reorder_level: i64,
    #[serde(default)]
    pub unit_price_cents: i64,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

/// Partial edit. Quantity changes go through [`adjust_quantity`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryUpdate {
    pub medication_name: Option<String>,
    pub unit: Option<String>,
    pub reorder_level: Option<i64>,
    pub unit_price_cents: Option<i64>,
    pub expiry_date: Option<NaiveDate>,
}

// ═══════════════════════════════════════════════════════════
// Shelf management
// ═══════════════════════════════════════════════════════════

/// Items of the caller's pharmacy. Admins may inspect any pharmacy.
pub fn list_items(
    conn: &Connection,
    user: &User,
    pharmacy_id: Option<Uuid>,
    low_stock_only: bool,
) -> Result<Vec<InventoryItem>, InventoryError> {
    let pharmacy_id = match (user.role, pharmacy_id) {
        (Role::Admin, Some(id)) => id,
        (Role::Pharmacy, _) => user.id,
        _ => return Err(InventoryError::NotAPharmacy),
    };
    Ok(repository::list_inventory_items(conn, &pharmacy_id, low_stock_only)?)
}

pub fn add_item(
    conn: &Connection,
    pharmacy: &User,
    new: NewInventoryItem,
) -> Result<InventoryItem, InventoryError> {
    let pharmacy_id = owning_pharmacy(pharmacy)?;
    let name = non_empty(&new.medication_name, "medication_name")?;
    let unit = non_empty(&new.unit, "unit")?;
    within_quantity(new.quantity, "quantity")?;
    within_quantity(new.reorder_level, "reorder_level")?;
    non_negative(new.unit_price_cents, "unit_price_cents")?;

    if repository::find_inventory_item_by_name(conn, &pharmacy_id, &name)?.is_some() {
        return Err(InventoryError::Duplicate(name));
    }

    let item = InventoryItem {
        id: Uuid::new_v4(),
        pharmacy_id,
        medication_name: name,
        quantity: new.quantity,
        unit,
        reorder_level: new.reorder_level,
        unit_price_cents: new.unit_price_cents,
        expiry_date: new.expiry_date,
        updated_at: db::now(),
    };
    repository::insert_inventory_item(conn, &item).map_err(|e| {
        if e.is_unique_violation() {
            InventoryError::Duplicate(item.medication_name.clone())
        } else {
            InventoryError::Database(e)
        }
    })?;
    tracing::info!(pharmacy_id = %pharmacy_id, item_id = %item.id, "Inventory item added");
    Ok(item)
}

pub fn update_item(
    conn: &Connection,
    pharmacy: &User,
    id: &Uuid,
    update: InventoryUpdate,
) -> Result<InventoryItem, InventoryError> {
    let mut item = owned_item(conn, pharmacy, id)?;

    if let Some(name) = update.medication_name {
        item.medication_name = non_empty(&name, "medication_name")?;
    }
    if let Some(unit) = update.unit {
        item.unit = non_empty(&unit, "unit")?;
    }
    if let Some(level) = update.reorder_level {
        within_quantity(level, "reorder_level")?;
        item.reorder_level = level;
    }
    if let Some(price) = update.unit_price_cents {
        non_negative(price, "unit_price_cents")?;
        item.unit_price_cents = price;
    }
    if update.expiry_date.is_some() {
        item.expiry_date = update.expiry_date;
    }
    item.updated_at = db::now();

    repository::update_inventory_item(conn, &item).map_err(|e| {
        if e.is_unique_violation() {
            InventoryError::Duplicate(item.medication_name.clone())
        } else {
            InventoryError::Database(e)
        }
    })?;
    Ok(item)
}

/// Restock (positive) or write off (negative). Never below zero.
pub fn adjust_quantity(
    conn: &Connection,
    pharmacy: &User,
    id: &Uuid,
    delta: i64,
) -> Result<InventoryItem, InventoryError> {
    let before = owned_item(conn, pharmacy, id)?;
    if delta == 0 {
        return Ok(before);
    }
    match before.quantity.checked_add(delta) {
        Some(target) if target < 0 => {
            return Err(InventoryError::InsufficientStock {
                medication: before.medication_name,
                available: before.quantity,
                requested: delta.checked_neg().unwrap_or(i64::MAX),
            })
        }
        Some(target) if target <= MAX_QUANTITY => {}
        _ => {
            return Err(InventoryError::Validation(format!(
                "quantity must not exceed {MAX_QUANTITY}"
            )))
        }
    }
    if !repository::apply_inventory_delta(conn, id, delta, &db::now())? {
        return Err(InventoryError::InsufficientStock {
            medication: before.medication_name,
            available: before.quantity,
            requested: delta.checked_neg().unwrap_or(i64::MAX),
        });
    }
    let after = repository::get_inventory_item(conn, id)?.ok_or(InventoryError::NotFound)?;
    tracing::debug!(item_id = %id, delta, quantity = after.quantity, "Stock adjusted");
    check_reorder_crossing(conn, &before, &after)?;
    Ok(after)
}

pub fn remove_item(conn: &Connection, pharmacy: &User, id: &Uuid) -> Result<(), InventoryError> {
    owned_item(conn, pharmacy, id)?;
    repository::delete_inventory_item(conn, id)?;
    tracing::info!(item_id = %id, "Inventory item removed");
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Prescription reservations
// ═══════════════════════════════════════════════════════════

/// Take every medication off the shelf or nothing at all.
///
/// Must run inside the caller's transaction: availability is checked for
/// all lines first, then each line is decremented with a guarded update.
pub fn reserve(
    conn: &Connection,
    pharmacy_id: &Uuid,
    meds: &[PrescriptionMedication],
) -> Result<(), InventoryError> {
    let mut plan = Vec::new();
    for (name, requested) in totals(meds).into_values() {
        let item = repository::find_inventory_item_by_name(conn, pharmacy_id, &name)?;
        match item {
            Some(item) if item.quantity >= requested => plan.push((item, requested)),
            Some(item) => {
                return Err(InventoryError::InsufficientStock {
                    medication: item.medication_name,
                    available: item.quantity,
                    requested,
                })
            }
            None => {
                return Err(InventoryError::InsufficientStock {
                    medication: name,
                    available: 0,
                    requested,
                })
            }
        }
    }

    let now = db::now();
    for (item, requested) in &plan {
        if !repository::apply_inventory_delta(conn, &item.id, -requested, &now)? {
            return Err(InventoryError::InsufficientStock {
                medication: item.medication_name.clone(),
                available: item.quantity,
                requested: *requested,
            });
        }
    }
    for (before, requested) in &plan {
        let after = InventoryItem {
            quantity: before.quantity - requested,
            ..before.clone()
        };
        check_reorder_crossing(conn, before, &after)?;
    }
    tracing::info!(pharmacy_id = %pharmacy_id, lines = plan.len(), "Stock reserved");
    Ok(())
}

/// Put reserved stock back. Lines whose item was since removed from the
/// shelf are skipped.
pub fn release(
    conn: &Connection,
    pharmacy_id: &Uuid,
    meds: &[PrescriptionMedication],
) -> Result<(), InventoryError> {
    let now = db::now();
    for (name, quantity) in totals(meds).into_values() {
        match repository::find_inventory_item_by_name(conn, pharmacy_id, &name)? {
            Some(item) => {
                repository::apply_inventory_delta(conn, &item.id, quantity, &now)?;
            }
            None => {
                tracing::warn!(pharmacy_id = %pharmacy_id, medication = %name, "Restock skipped: item no longer stocked");
            }
        }
    }
    tracing::info!(pharmacy_id = %pharmacy_id, "Reserved stock released");
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════

/// Quantity per medication, merged case-insensitively. Keeps the first
/// spelling seen so errors name the medication as prescribed.
fn totals(meds: &[PrescriptionMedication]) -> BTreeMap<String, (String, i64)> {
    let mut totals: BTreeMap<String, (String, i64)> = BTreeMap::new();
    for med in meds {
        let name = med.medication_name.trim();
        let entry = totals
            .entry(name.to_lowercase())
            .or_insert_with(|| (name.to_string(), 0));
        entry.1 = entry.1.saturating_add(med.quantity);
    }
    totals
}

fn check_reorder_crossing(
    conn: &Connection,
    before: &InventoryItem,
    after: &InventoryItem,
) -> Result<(), InventoryError> {
    if before.is_low_stock() || !after.is_low_stock() {
        return Ok(());
    }
    let message = format!(
        "{} is low: {} {} left (reorder level {})",
        after.medication_name, after.quantity, after.unit, after.reorder_level
    );
    system_alerts::raise(conn, AlertSeverity::Warning, "inventory", &message)?;
    notifications::notify(
        conn,
        &after.pharmacy_id,
        NotificationKind::Inventory,
        "Low stock",
        &message,
        Some("/inventory".to_string()),
    )?;
    Ok(())
}

fn owning_pharmacy(user: &User) -> Result<Uuid, InventoryError> {
    authorization::require(user, Action::ManageInventory)?;
    if user.role == Role::Pharmacy {
        Ok(user.id)
    } else {
        Err(InventoryError::NotAPharmacy)
    }
}

fn owned_item(conn: &Connection, pharmacy: &User, id: &Uuid) -> Result<InventoryItem, InventoryError> {
    let pharmacy_id = owning_pharmacy(pharmacy)?;
    match repository::get_inventory_item(conn, id)? {
        Some(item) if item.pharmacy_id == pharmacy_id => Ok(item),
        _ => Err(InventoryError::NotFound),
    }
}

fn non_empty(value: &str, field: &str) -> Result<String, InventoryError> {
    let value = value.trim();
    if value.is_empty() {
        Err(InventoryError::Validation(format!("{field} must not be empty")))
    } else {
        Ok(value.to_string())
    }
}

fn within_quantity(value: i64, field: &str) -> Result<(), InventoryError> {
    non_negative(value, field)?;
    if value > MAX_QUANTITY {
        Err(InventoryError::Validation(format!("{field} must not exceed {MAX_QUANTITY}")))
    } else {
        Ok(())
    }
}

fn non_negative(value: i64, field: &str) -> Result<(), InventoryError> {
    if value < 0 {
        Err(InventoryError::Validation(format!("{field} must not be negative")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::test_support::make_user;

    fn stock(name: &str, quantity: i64, reorder_level: i64) -> NewInventoryItem {
        NewInventoryItem {
            medication_name: name.into(),
            quantity,
            unit: "tablets".into(),
            reorder_level,
            unit_price_cents: 25,
            expiry_date: None,
        }
    }

    fn med(name: &str, quantity: i64) -> PrescriptionMedication {
        PrescriptionMedication {
            id: Uuid::new_v4(),
            prescription_id: Uuid::new_v4(),
            medication_name: name.into(),
            dosage: "500mg".into(),
            frequency: "twice daily".into(),
            duration: "7 days".into(),
            quantity,
            instructions: None,
        }
    }

    #[test]
    fn duplicate_name_is_case_insensitive() {
        let conn = open_memory_database().unwrap();
        let pharmacy = make_user(&conn, Role::Pharmacy);
        add_item(&conn, &pharmacy, stock("Amoxicillin", 10, 0)).unwrap();
        assert!(matches!(
            add_item(&conn, &pharmacy, stock("AMOXICILLIN", 5, 0)),
            Err(InventoryError::Duplicate(_))
        ));
    }

    #[test]
    fn doctor_cannot_stock_shelves() {
        let conn = open_memory_database().unwrap();
        let doctor = make_user(&conn, Role::Doctor);
        assert!(matches!(
            add_item(&conn, &doctor, stock("Ibuprofen", 10, 0)),
            Err(InventoryError::Forbidden(_))
        ));
    }

    #[test]
    fn adjust_never_goes_negative() {
        let conn = open_memory_database().unwrap();
        let pharmacy = make_user(&conn, Role::Pharmacy);
        let item = add_item(&conn, &pharmacy, stock("Ibuprofen", 3, 0)).unwrap();
        assert!(matches!(
            adjust_quantity(&conn, &pharmacy, &item.id, -4),
            Err(InventoryError::InsufficientStock { available: 3, .. })
        ));
        assert_eq!(adjust_quantity(&conn, &pharmacy, &item.id, -3).unwrap().quantity, 0);
    }

    #[test]
    fn other_pharmacy_items_are_invisible() {
        let conn = open_memory_database().unwrap();
        let a = make_user(&conn, Role::Pharmacy);
        let b = make_user(&conn, Role::Pharmacy);
        let item = add_item(&conn, &a, stock("Ibuprofen", 3, 0)).unwrap();
        assert!(matches!(
            remove_item(&conn, &b, &item.id),
            Err(InventoryError::NotFound)
        ));
        assert!(list_items(&conn, &b, None, false).unwrap().is_empty());
    }

    #[test]
    fn reserve_is_all_or_nothing() {
        let conn = open_memory_database().unwrap();
        let pharmacy = make_user(&conn, Role::Pharmacy);
        add_item(&conn, &pharmacy, stock("Amoxicillin", 20, 0)).unwrap();
        add_item(&conn, &pharmacy, stock("Ibuprofen", 2, 0)).unwrap();

        let err = reserve(
            &conn,
            &pharmacy.id,
            &[med("amoxicillin", 10), med("Ibuprofen", 5)],
        )
        .unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientStock { ref medication, .. } if medication == "Ibuprofen"));

        let items = list_items(&conn, &pharmacy, None, false).unwrap();
        assert!(items.iter().any(|i| i.medication_name == "Amoxicillin" && i.quantity == 20));
    }

    #[test]
    fn reserve_then_release_restores_stock() {
        let conn = open_memory_database().unwrap();
        let pharmacy = make_user(&conn, Role::Pharmacy);
        let item = add_item(&conn, &pharmacy, stock("Amoxicillin", 20, 0)).unwrap();
        let meds = [med("Amoxicillin", 6), med("amoxicillin", 4)];

        reserve(&conn, &pharmacy.id, &meds).unwrap();
        assert_eq!(repository::get_inventory_item(&conn, &item.id).unwrap().unwrap().quantity, 10);
        release(&conn, &pharmacy.id, &meds).unwrap();
        assert_eq!(repository::get_inventory_item(&conn, &item.id).unwrap().unwrap().quantity, 20);
    }

    #[test]
    fn unknown_medication_is_insufficient() {
        let conn = open_memory_database().unwrap();
        let pharmacy = make_user(&conn, Role::Pharmacy);
        assert!(matches!(
            reserve(&conn, &pharmacy.id, &[med("Unobtainium", 1)]),
            Err(InventoryError::InsufficientStock { available: 0, .. })
        ));
    }

    #[test]
    fn missing_medication_reported_as_prescribed() {
        let conn = open_memory_database().unwrap();
        let pharmacy = make_user(&conn, Role::Pharmacy);
        let err = reserve(&conn, &pharmacy.id, &[med(" Warfarin ", 14)]).unwrap_err();
        assert!(err.to_string().contains("Warfarin"), "{err}");
        assert!(matches!(err, InventoryError::InsufficientStock { ref medication, .. } if medication == "Warfarin"));
    }

    #[test]
    fn adjust_rejects_overflowing_restock() {
        let conn = open_memory_database().unwrap();
        let pharmacy = make_user(&conn, Role::Pharmacy);
        let item = add_item(&conn, &pharmacy, stock("Ibuprofen", 3, 0)).unwrap();

        assert!(matches!(
            adjust_quantity(&conn, &pharmacy, &item.id, i64::MAX),
            Err(InventoryError::Validation(_))
        ));
        assert!(matches!(
            adjust_quantity(&conn, &pharmacy, &item.id, MAX_QUANTITY),
            Err(InventoryError::Validation(_))
        ));
        // Shelf still readable and untouched
        let items = list_items(&conn, &pharmacy, None, false).unwrap();
        assert_eq!(items[0].quantity, 3);
        assert_eq!(adjust_quantity(&conn, &pharmacy, &item.id, MAX_QUANTITY - 3).unwrap().quantity, MAX_QUANTITY);
    }

    #[test]
    fn adjust_by_min_delta_is_insufficient() {
        let conn = open_memory_database().unwrap();
        let pharmacy = make_user(&conn, Role::Pharmacy);
        let item = add_item(&conn, &pharmacy, stock("Ibuprofen", 3, 0)).unwrap();
        assert!(matches!(
            adjust_quantity(&conn, &pharmacy, &item.id, i64::MIN),
            Err(InventoryError::InsufficientStock { available: 3, requested: i64::MAX, .. })
        ));
    }

    #[test]
    fn add_item_caps_quantity() {
        let conn = open_memory_database().unwrap();
        let pharmacy = make_user(&conn, Role::Pharmacy);
        assert!(matches!(
            add_item(&conn, &pharmacy, stock("Ibuprofen", MAX_QUANTITY + 1, 0)),
            Err(InventoryError::Validation(_))
        ));
        assert!(matches!(
            add_item(&conn, &pharmacy, stock("Ibuprofen", 10, i64::MAX)),
            Err(InventoryError::Validation(_))
        ));
    }

    #[test]
    fn low_stock_warning_fires_once_per_crossing() {
        let conn = open_memory_database().unwrap();
        let pharmacy = make_user(&conn, Role::Pharmacy);
        let item = add_item(&conn, &pharmacy, stock("Insulin", 10, 5)).unwrap();

        adjust_quantity(&conn, &pharmacy, &item.id, -5).unwrap();
        adjust_quantity(&conn, &pharmacy, &item.id, -2).unwrap();
        assert_eq!(repository::count_active_system_alerts(&conn).unwrap(), 1);
        assert_eq!(repository::count_unread_notifications(&conn, &pharmacy.id).unwrap(), 1);

        adjust_quantity(&conn, &pharmacy, &item.id, 10).unwrap();
        adjust_quantity(&conn, &pharmacy, &item.id, -10).unwrap();
        assert_eq!(repository::count_active_system_alerts(&conn).unwrap(), 2);
        assert_eq!(list_items(&conn, &pharmacy, None, true).unwrap().len(), 1);
    }
}
