use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stocked medication line on a pharmacy's shelf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub pharmacy_id: Uuid,
    pub medication_name: String,
    pub quantity: i64,
    pub unit: String,
    pub reorder_level: i64,
    pub unit_price_cents: i64,
    pub expiry_date: Option<NaiveDate>,
    pub updated_at: NaiveDateTime,
}

impl InventoryItem {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.reorder_level
    }
}
