use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{fmt_ts, parse_date, parse_ts, parse_uuid, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

const USER_COLUMNS: &str = "id, email, full_name, role, phone, is_active, created_at,
     department_id, specialization, license_number, pharmacy_name, address, date_of_birth";

pub fn insert_user(conn: &Connection, user: &User, password_hash: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, email, password_hash, full_name, role, phone, is_active, created_at,
         department_id, specialization, license_number, pharmacy_name, address, date_of_birth)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            user.id.to_string(),
            user.email,
            password_hash,
            user.full_name,
            user.role.as_str(),
            user.phone,
            user.is_active as i32,
            fmt_ts(&user.created_at),
            user.department_id.map(|id| id.to_string()),
            user.specialization,
            user.license_number,
            user.pharmacy_name,
            user.address,
            user.date_of_birth.map(|d| d.to_string()),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id.to_string()],
        user_row_from_rusqlite,
    )
    .optional()?
    .map(user_from_row)
    .transpose()
}

/// Look up an account with its stored password hash (login path only).
pub fn get_user_credentials(
    conn: &Connection,
    email: &str,
) -> Result<Option<(User, String)>, DatabaseError> {
    let found = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1"),
            params![email],
            |row| Ok((user_row_from_rusqlite(row)?, row.get::<_, String>(13)?)),
        )
        .optional()?;

    match found {
        Some((row, hash)) => Ok(Some((user_from_row(row)?, hash))),
        None => Ok(None),
    }
}

pub fn get_password_hash(conn: &Connection, id: &Uuid) -> Result<Option<String>, DatabaseError> {
    let hash = conn
        .query_row(
            "SELECT password_hash FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hash)
}

pub fn email_exists(conn: &Connection, email: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE email = ?1",
        params![email],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list_users(conn: &Connection, filter: &UserFilter) -> Result<Vec<User>, DatabaseError> {
    let mut sql = format!("SELECT {USER_COLUMNS} FROM users WHERE 1=1");
    let mut values: Vec<String> = Vec::new();

    if let Some(role) = &filter.role {
        values.push(role.as_str().to_string());
        sql.push_str(&format!(" AND role = ?{}", values.len()));
    }
    if let Some(dept) = &filter.department_id {
        values.push(dept.to_string());
        sql.push_str(&format!(" AND department_id = ?{}", values.len()));
    }
    if filter.active_only {
        sql.push_str(" AND is_active = 1");
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        values.push(super::contains_pattern(search.trim()));
        let n = values.len();
        sql.push_str(&format!(
            " AND (full_name LIKE ?{n} ESCAPE '\\' OR email LIKE ?{n} ESCAPE '\\' \
             OR pharmacy_name LIKE ?{n} ESCAPE '\\' OR specialization LIKE ?{n} ESCAPE '\\')"
        ));
    }
    sql.push_str(" ORDER BY full_name COLLATE NOCASE");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), user_row_from_rusqlite)?;

    let mut users = Vec::new();
    for row in rows {
        users.push(user_from_row(row?)?);
    }
    Ok(users)
}

/// Contact and role-profile fields a user may edit on their own account.
pub fn update_user_profile(
    conn: &Connection,
    id: &Uuid,
    full_name: &str,
    phone: Option<&str>,
    profile: &RoleProfile,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET full_name = ?2, phone = ?3, department_id = ?4, specialization = ?5,
         license_number = ?6, pharmacy_name = ?7, address = ?8, date_of_birth = ?9
         WHERE id = ?1",
        params![
            id.to_string(),
            full_name,
            phone,
            profile.department_id.map(|d| d.to_string()),
            profile.specialization,
            profile.license_number,
            profile.pharmacy_name,
            profile.address,
            profile.date_of_birth.map(|d| d.to_string()),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

pub fn update_password_hash(conn: &Connection, id: &Uuid, hash: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?2 WHERE id = ?1",
        params![id.to_string(), hash],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

pub fn set_user_active(conn: &Connection, id: &Uuid, active: bool) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET is_active = ?2 WHERE id = ?1",
        params![id.to_string(), active as i32],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

/// Account totals per role (active and inactive together).
pub fn count_users_by_role(conn: &Connection) -> Result<Vec<(Role, i64)>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT role, COUNT(*) FROM users GROUP BY role ORDER BY role")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = Vec::new();
    for row in rows {
        let (role, count) = row?;
        counts.push((Role::from_str(&role)?, count));
    }
    Ok(counts)
}

struct UserRow {
    id: String,
    email: String,
    full_name: String,
    role: String,
    phone: Option<String>,
    is_active: i32,
    created_at: String,
    department_id: Option<String>,
    specialization: Option<String>,
    license_number: Option<String>,
    pharmacy_name: Option<String>,
    address: Option<String>,
    date_of_birth: Option<String>,
}

fn user_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        role: row.get(3)?,
        phone: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        department_id: row.get(7)?,
        specialization: row.get(8)?,
        license_number: row.get(9)?,
        pharmacy_name: row.get(10)?,
        address: row.get(11)?,
        date_of_birth: row.get(12)?,
    })
}

fn user_from_row(row: UserRow) -> Result<User, DatabaseError> {
    Ok(User {
        id: parse_uuid(&row.id)?,
        email: row.email,
        full_name: row.full_name,
        role: Role::from_str(&row.role)?,
        phone: row.phone,
        is_active: row.is_active != 0,
        created_at: parse_ts(&row.created_at)?,
        department_id: row.department_id.and_then(|s| Uuid::parse_str(&s).ok()),
        specialization: row.specialization,
        license_number: row.license_number,
        pharmacy_name: row.pharmacy_name,
        address: row.address,
        date_of_birth: row.date_of_birth.as_deref().and_then(parse_date),
    })
}
