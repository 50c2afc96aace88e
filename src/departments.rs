//! Clinical departments. Anyone may browse; only admins edit.

use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::authorization::{self, Action, AuthorizationError};
use crate::db::{self, repository, DatabaseError};
use crate::models::enums::Role;
use crate::models::{Department, User, UserFilter};

#[derive(Debug, thiserror::Error)]
pub enum DepartmentError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Forbidden(#[from] AuthorizationError),
    #[error("Department not found")]
    NotFound,
    #[error("Department name must not be empty")]
    EmptyName,
    #[error("A department with this name already exists")]
    DuplicateName,
    #[error("Department still has {0} doctor(s) assigned")]
    HasDoctors(i64),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepartmentInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub fn list(conn: &Connection) -> Result<Vec<Department>, DepartmentError> {
    Ok(repository::list_departments(conn)?)
}

pub fn create(conn: &Connection, admin: &User, input: DepartmentInput) -> Result<Department, DepartmentError> {
    authorization::require(admin, Action::ManageDepartments)?;
    let name = input.name.trim();
    if name.is_empty() {
        return Err(DepartmentError::EmptyName);
    }
    let dept = Department {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: input.description.filter(|d| !d.trim().is_empty()),
        created_at: db::now(),
    };
    repository::insert_department(conn, &dept).map_err(map_unique)?;
    tracing::info!(department_id = %dept.id, name = %dept.name, "Department created");
    Ok(dept)
}

pub fn update(
    conn: &Connection,
    admin: &User,
    id: &Uuid,
    input: DepartmentInput,
) -> Result<Department, DepartmentError> {
    authorization::require(admin, Action::ManageDepartments)?;
    let name = input.name.trim();
    if name.is_empty() {
        return Err(DepartmentError::EmptyName);
    }
    repository::update_department(conn, id, name, input.description.as_deref()).map_err(map_unique)?;
    repository::get_department(conn, id)?.ok_or(DepartmentError::NotFound)
}

/// Refuses while doctors are still attached.
pub fn delete(conn: &Connection, admin: &User, id: &Uuid) -> Result<(), DepartmentError> {
    authorization::require(admin, Action::ManageDepartments)?;
    let doctors = repository::count_department_doctors(conn, id)?;
    if doctors > 0 {
        return Err(DepartmentError::HasDoctors(doctors));
    }
    repository::delete_department(conn, id).map_err(map_unique)?;
    tracing::info!(department_id = %id, "Department deleted");
    Ok(())
}

/// Active doctors of a department, for patients choosing whom to book.
pub fn doctors(conn: &Connection, id: &Uuid) -> Result<Vec<User>, DepartmentError> {
    if repository::get_department(conn, id)?.is_none() {
        return Err(DepartmentError::NotFound);
    }
    let filter = UserFilter {
        role: Some(Role::Doctor),
        department_id: Some(*id),
        active_only: true,
        search: None,
    };
    Ok(repository::list_users(conn, &filter)?)
}

fn map_unique(e: DatabaseError) -> DepartmentError {
    match e {
        DatabaseError::NotFound { .. } => DepartmentError::NotFound,
        e if e.is_unique_violation() => DepartmentError::DuplicateName,
        e => DepartmentError::Database(e),
    }
}
