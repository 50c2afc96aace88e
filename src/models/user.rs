use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Role;

/// A platform account. Role-specific columns are optional and only
/// populated for the matching role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub department_id: Option<Uuid>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub pharmacy_name: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Name shown to other parties (pharmacies go by their store name).
    pub fn display_name(&self) -> &str {
        match (&self.role, &self.pharmacy_name) {
            (Role::Pharmacy, Some(name)) => name,
            _ => &self.full_name,
        }
    }
}

/// Role-discriminated profile fields supplied at account creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleProfile {
    pub department_id: Option<Uuid>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub pharmacy_name: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}
