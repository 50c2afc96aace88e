use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{fmt_ts, parse_ts, parse_uuid, DatabaseError};
use crate::models::*;

pub fn insert_department(conn: &Connection, dept: &Department) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO departments (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            dept.id.to_string(),
            dept.name,
            dept.description,
            fmt_ts(&dept.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_department(conn: &Connection, id: &Uuid) -> Result<Option<Department>, DatabaseError> {
    conn.query_row(
        "SELECT id, name, description, created_at FROM departments WHERE id = ?1",
        params![id.to_string()],
        department_row_from_rusqlite,
    )
    .optional()?
    .map(department_from_row)
    .transpose()
}

pub fn list_departments(conn: &Connection) -> Result<Vec<Department>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, created_at FROM departments ORDER BY name COLLATE NOCASE",
    )?;
    let rows = stmt.query_map([], department_row_from_rusqlite)?;

    let mut depts = Vec::new();
    for row in rows {
        depts.push(department_from_row(row?)?);
    }
    Ok(depts)
}

pub fn update_department(
    conn: &Connection,
    id: &Uuid,
    name: &str,
    description: Option<&str>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE departments SET name = ?2, description = ?3 WHERE id = ?1",
        params![id.to_string(), name, description],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Department", id));
    }
    Ok(())
}

pub fn delete_department(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM departments WHERE id = ?1",
        params![id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Department", id));
    }
    Ok(())
}

/// Number of doctor accounts attached to the department.
pub fn count_department_doctors(conn: &Connection, id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE department_id = ?1 AND role = 'DOCTOR'",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

struct DepartmentRow {
    id: String,
    name: String,
    description: Option<String>,
    created_at: String,
}

fn department_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<DepartmentRow, rusqlite::Error> {
    Ok(DepartmentRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn department_from_row(row: DepartmentRow) -> Result<Department, DatabaseError> {
    Ok(Department {
        id: parse_uuid(&row.id)?,
        name: row.name,
        description: row.description,
        created_at: parse_ts(&row.created_at)?,
    })
}
