//! Accounts and sessions.
//!
//! Registration, admin-managed users, password login and bearer-token
//! sessions. Tokens are random, returned once at login and stored only
//! as a SHA-256 hash.

use std::sync::LazyLock;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{self, Action, AuthorizationError};
use crate::config::MAX_SESSION_TTL_HOURS;
use crate::crypto::{self, CryptoError};
use crate::db::{self, repository, DatabaseError};
use crate::models::enums::Role;
use crate::models::{RoleProfile, User, UserFilter};

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Forbidden(#[from] AuthorizationError),
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("An account with this email already exists")]
    EmailTaken,
    #[error("{0}")]
    Validation(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Current password is incorrect")]
    WrongPassword,
    #[error("Not authenticated")]
    InvalidSession,
    #[error("Session expired")]
    SessionExpired,
    #[error("User not found")]
    NotFound,
}

/// Account creation payload. `role` is ignored on self-registration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub profile: RoleProfile,
}

/// Fields a user may change on their own account. Absent fields keep
/// their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub pharmacy_name: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user: User,
    pub expires_at: NaiveDateTime,
}

// ═══════════════════════════════════════════════════════════
// Creation
// ═══════════════════════════════════════════════════════════

/// Public self-registration. Always creates a patient.
pub fn register_patient(conn: &Connection, new: NewUser) -> Result<User, AccountError> {
    let profile = RoleProfile {
        date_of_birth: new.profile.date_of_birth,
        address: new.profile.address.clone(),
        ..RoleProfile::default()
    };
    insert_account(conn, new, Role::Patient, profile)
}

/// Admin-created account of any role.
pub fn create_user(conn: &Connection, admin: &User, new: NewUser) -> Result<User, AccountError> {
    authorization::require(admin, Action::ManageUsers)?;
    let role = new
        .role
        .ok_or_else(|| AccountError::Validation("role is required".into()))?;
    let profile = new.profile.clone();
    validate_role_profile(conn, role, &profile)?;
    insert_account(conn, new, role, profile)
}

fn insert_account(
    conn: &Connection,
    new: NewUser,
    role: Role,
    profile: RoleProfile,
) -> Result<User, AccountError> {
    let email = normalize_email(&new.email)?;
    let full_name = required(&new.full_name, "full_name")?;
    crypto::check_password_policy(&new.password)?;

    if repository::email_exists(conn, &email)? {
        return Err(AccountError::EmailTaken);
    }

    let user = User {
        id: Uuid::new_v4(),
        email,
        full_name,
        role,
        phone: trimmed(new.phone),
        is_active: true,
        created_at: db::now(),
        department_id: profile.department_id,
        specialization: trimmed(profile.specialization),
        license_number: trimmed(profile.license_number),
        pharmacy_name: trimmed(profile.pharmacy_name),
        address: trimmed(profile.address),
        date_of_birth: profile.date_of_birth,
    };
    let hash = crypto::hash_password(&new.password)?;

    repository::insert_user(conn, &user, &hash).map_err(|e| {
        if e.is_unique_violation() {
            AccountError::EmailTaken
        } else {
            AccountError::Database(e)
        }
    })?;

    tracing::info!(user_id = %user.id, role = role.as_str(), "Account created");
    Ok(user)
}

/// Doctors need a department, specialization and license; pharmacies a
/// store name and address.
fn validate_role_profile(conn: &Connection, role: Role, profile: &RoleProfile) -> Result<(), AccountError> {
    match role {
        Role::Doctor => {
            let dept = profile
                .department_id
                .ok_or_else(|| AccountError::Validation("doctor requires department_id".into()))?;
            if repository::get_department(conn, &dept)?.is_none() {
                return Err(AccountError::Validation("unknown department".into()));
            }
            required_opt(&profile.specialization, "specialization")?;
            required_opt(&profile.license_number, "license_number")?;
        }
        Role::Pharmacy => {
            required_opt(&profile.pharmacy_name, "pharmacy_name")?;
            required_opt(&profile.address, "address")?;
        }
        Role::Patient | Role::Admin => {}
    }
    Ok(())
}

/// Create the configured administrator on first start. No-op if any
/// admin account already exists.
pub fn ensure_bootstrap_admin(
    conn: &Connection,
    email: &str,
    password: &str,
) -> Result<Option<User>, AccountError> {
    let filter = UserFilter {
        role: Some(Role::Admin),
        ..UserFilter::default()
    };
    if !repository::list_users(conn, &filter)?.is_empty() {
        return Ok(None);
    }
    let new = NewUser {
        email: email.to_string(),
        password: password.to_string(),
        full_name: "Administrator".to_string(),
        role: Some(Role::Admin),
        phone: None,
        profile: RoleProfile::default(),
    };
    let admin = insert_account(conn, new, Role::Admin, RoleProfile::default())?;
    tracing::info!(email = %admin.email, "Bootstrap administrator created");
    Ok(Some(admin))
}

// ═══════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════

pub fn login(
    conn: &Connection,
    email: &str,
    password: &str,
    ttl_hours: i64,
) -> Result<Session, AccountError> {
    let email = email.trim().to_lowercase();
    let Some((user, hash)) = repository::get_user_credentials(conn, &email)? else {
        tracing::debug!("Login failed: unknown email");
        return Err(AccountError::InvalidCredentials);
    };
    if !crypto::verify_password(password, &hash) {
        tracing::debug!(user_id = %user.id, "Login failed: bad password");
        return Err(AccountError::InvalidCredentials);
    }
    if !user.is_active {
        tracing::debug!(user_id = %user.id, "Login failed: account inactive");
        return Err(AccountError::InvalidCredentials);
    }

    let token = crypto::generate_token();
    let created = db::now();
    let expires_at = Duration::try_hours(ttl_hours.clamp(0, MAX_SESSION_TTL_HOURS))
        .and_then(|ttl| created.checked_add_signed(ttl))
        .ok_or_else(|| AccountError::Validation("Session lifetime out of range".into()))?;
    repository::insert_session(conn, &crypto::hash_token(&token), &user.id, &created, &expires_at)?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "User logged in");
    Ok(Session {
        token,
        user,
        expires_at,
    })
}

/// Resolve a bearer token to its active user. Expired sessions are
/// removed on sight.
pub fn authenticate(conn: &Connection, token: &str) -> Result<User, AccountError> {
    let token_hash = crypto::hash_token(token);
    let (user_id, expires_at) =
        repository::get_session(conn, &token_hash)?.ok_or(AccountError::InvalidSession)?;

    if expires_at <= db::now() {
        repository::delete_session(conn, &token_hash)?;
        return Err(AccountError::SessionExpired);
    }

    let user = repository::get_user(conn, &user_id)?.ok_or(AccountError::InvalidSession)?;
    if !user.is_active {
        repository::delete_user_sessions(conn, &user.id)?;
        return Err(AccountError::InvalidSession);
    }
    Ok(user)
}

pub fn logout(conn: &Connection, token: &str) -> Result<(), AccountError> {
    repository::delete_session(conn, &crypto::hash_token(token))?;
    Ok(())
}

pub fn purge_expired_sessions(conn: &Connection) -> Result<usize, AccountError> {
    let purged = repository::delete_expired_sessions(conn, &db::now())?;
    if purged > 0 {
        tracing::info!(purged, "Expired sessions removed");
    }
    Ok(purged)
}

// ═══════════════════════════════════════════════════════════
// Profile
// ═══════════════════════════════════════════════════════════

pub fn update_profile(
    conn: &Connection,
    user_id: &Uuid,
    update: ProfileUpdate,
) -> Result<User, AccountError> {
    let user = repository::get_user(conn, user_id)?.ok_or(AccountError::NotFound)?;

    let full_name = match update.full_name {
        Some(name) => required(&name, "full_name")?,
        None => user.full_name.clone(),
    };
    let phone = update.phone.map(Some).unwrap_or(user.phone.clone());
    let profile = RoleProfile {
        department_id: user.department_id,
        specialization: update.specialization.or(user.specialization.clone()),
        license_number: update.license_number.or(user.license_number.clone()),
        pharmacy_name: update.pharmacy_name.or(user.pharmacy_name.clone()),
        address: update.address.or(user.address.clone()),
        date_of_birth: update.date_of_birth.or(user.date_of_birth),
    };
    if user.role != Role::Patient {
        validate_role_profile(conn, user.role, &profile)?;
    }

    repository::update_user_profile(conn, user_id, &full_name, trimmed(phone).as_deref(), &profile)?;
    repository::get_user(conn, user_id)?.ok_or(AccountError::NotFound)
}

/// Change the caller's password. Every session of the user is revoked,
/// including the one making the request, so the client must log in again.
pub fn change_password(
    conn: &Connection,
    user_id: &Uuid,
    current: &str,
    new_password: &str,
) -> Result<(), AccountError> {
    let hash = repository::get_password_hash(conn, user_id)?.ok_or(AccountError::NotFound)?;
    if !crypto::verify_password(current, &hash) {
        return Err(AccountError::WrongPassword);
    }
    crypto::check_password_policy(new_password)?;
    repository::update_password_hash(conn, user_id, &crypto::hash_password(new_password)?)?;
    repository::delete_user_sessions(conn, user_id)?;
    tracing::info!(user_id = %user_id, "Password changed");
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Administration
// ═══════════════════════════════════════════════════════════

pub fn list_users(conn: &Connection, admin: &User, filter: &UserFilter) -> Result<Vec<User>, AccountError> {
    authorization::require(admin, Action::ManageUsers)?;
    Ok(repository::list_users(conn, filter)?)
}

/// Activate or deactivate an account. Deactivation revokes every session.
pub fn set_active(
    conn: &Connection,
    admin: &User,
    user_id: &Uuid,
    active: bool,
) -> Result<User, AccountError> {
    authorization::require(admin, Action::ManageUsers)?;
    if admin.id == *user_id && !active {
        return Err(AccountError::Validation("cannot deactivate your own account".into()));
    }
    repository::set_user_active(conn, user_id, active).map_err(|e| match e {
        DatabaseError::NotFound { .. } => AccountError::NotFound,
        other => AccountError::Database(other),
    })?;
    if !active {
        let revoked = repository::delete_user_sessions(conn, user_id)?;
        tracing::info!(user_id = %user_id, revoked, "Account deactivated");
    } else {
        tracing::info!(user_id = %user_id, "Account activated");
    }
    repository::get_user(conn, user_id)?.ok_or(AccountError::NotFound)
}

/// Active accounts of one role, e.g. pharmacies a patient can route to.
pub fn list_active_by_role(conn: &Connection, role: Role) -> Result<Vec<User>, AccountError> {
    let filter = UserFilter {
        role: Some(role),
        active_only: true,
        ..UserFilter::default()
    };
    Ok(repository::list_users(conn, &filter)?)
}

// ═══════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════

fn normalize_email(raw: &str) -> Result<String, AccountError> {
    let email = raw.trim().to_lowercase();
    if EMAIL_PATTERN.is_match(&email) {
        Ok(email)
    } else {
        Err(AccountError::InvalidEmail)
    }
}

fn required(value: &str, field: &str) -> Result<String, AccountError> {
    let value = value.trim();
    if value.is_empty() {
        Err(AccountError::Validation(format!("{field} must not be empty")))
    } else {
        Ok(value.to_string())
    }
}

fn required_opt(value: &Option<String>, field: &str) -> Result<(), AccountError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(()),
        _ => Err(AccountError::Validation(format!("{field} is required"))),
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::test_support::{make_department, make_user};

    fn new_user(email: &str, role: Option<Role>) -> NewUser {
        NewUser {
            email: email.into(),
            password: "correct horse".into(),
            full_name: "Jane Doe".into(),
            role,
            phone: None,
            profile: RoleProfile::default(),
        }
    }

    #[test]
    fn register_forces_patient_role() {
        let conn = open_memory_database().unwrap();
        let user = register_patient(&conn, new_user("Jane@Example.com", Some(Role::Admin))).unwrap();
        assert_eq!(user.role, Role::Patient);
        assert_eq!(user.email, "jane@example.com");
    }

    #[test]
    fn duplicate_email_is_case_insensitive() {
        let conn = open_memory_database().unwrap();
        register_patient(&conn, new_user("jane@example.com", None)).unwrap();
        let err = register_patient(&conn, new_user("JANE@example.com", None)).unwrap_err();
        assert!(matches!(err, AccountError::EmailTaken));
    }

    #[test]
    fn invalid_email_and_short_password_rejected() {
        let conn = open_memory_database().unwrap();
        assert!(matches!(
            register_patient(&conn, new_user("not-an-email", None)),
            Err(AccountError::InvalidEmail)
        ));
        let mut weak = new_user("a@b.co", None);
        weak.password = "short".into();
        assert!(matches!(
            register_patient(&conn, weak),
            Err(AccountError::Crypto(CryptoError::WeakPassword(_)))
        ));
    }

    #[test]
    fn doctor_requires_department_and_license() {
        let conn = open_memory_database().unwrap();
        let admin = make_user(&conn, Role::Admin);
        let dept = make_department(&conn, "Cardiology");

        let mut doctor = new_user("doc@example.com", Some(Role::Doctor));
        assert!(matches!(
            create_user(&conn, &admin, doctor.clone()),
            Err(AccountError::Validation(_))
        ));

        doctor.profile = RoleProfile {
            department_id: Some(dept.id),
            specialization: Some("Cardiology".into()),
            license_number: Some("MD-42".into()),
            ..RoleProfile::default()
        };
        let created = create_user(&conn, &admin, doctor).unwrap();
        assert_eq!(created.role, Role::Doctor);
        assert_eq!(created.department_id, Some(dept.id));
    }

    #[test]
    fn non_admin_cannot_create_users() {
        let conn = open_memory_database().unwrap();
        let doctor = make_user(&conn, Role::Doctor);
        let err = create_user(&conn, &doctor, new_user("x@example.com", Some(Role::Patient)))
            .unwrap_err();
        assert!(matches!(err, AccountError::Forbidden(_)));
    }

    #[test]
    fn login_then_authenticate_then_logout() {
        let conn = open_memory_database().unwrap();
        register_patient(&conn, new_user("jane@example.com", None)).unwrap();

        let session = login(&conn, " JANE@example.com ", "correct horse", 12).unwrap();
        let user = authenticate(&conn, &session.token).unwrap();
        assert_eq!(user.id, session.user.id);

        logout(&conn, &session.token).unwrap();
        assert!(matches!(
            authenticate(&conn, &session.token),
            Err(AccountError::InvalidSession)
        ));
    }

    #[test]
    fn login_failures_are_indistinguishable() {
        let conn = open_memory_database().unwrap();
        register_patient(&conn, new_user("jane@example.com", None)).unwrap();
        let wrong = login(&conn, "jane@example.com", "wrong password", 12).unwrap_err();
        let unknown = login(&conn, "nobody@example.com", "correct horse", 12).unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[test]
    fn expired_session_reported_and_removed() {
        let conn = open_memory_database().unwrap();
        register_patient(&conn, new_user("jane@example.com", None)).unwrap();
        let session = login(&conn, "jane@example.com", "correct horse", 0).unwrap();

        assert!(matches!(
            authenticate(&conn, &session.token),
            Err(AccountError::SessionExpired)
        ));
        assert!(matches!(
            authenticate(&conn, &session.token),
            Err(AccountError::InvalidSession)
        ));
    }

    #[test]
    fn session_lifetime_is_capped() {
        let conn = open_memory_database().unwrap();
        register_patient(&conn, new_user("jane@example.com", None)).unwrap();
        let session = login(&conn, "jane@example.com", "correct horse", 1_000_000_000_000_000).unwrap();
        assert!(session.expires_at <= db::now() + Duration::hours(MAX_SESSION_TTL_HOURS));
        assert!(authenticate(&conn, &session.token).is_ok());
    }

    #[test]
    fn deactivation_revokes_sessions_and_blocks_login() {
        let conn = open_memory_database().unwrap();
        let admin = make_user(&conn, Role::Admin);
        let patient = register_patient(&conn, new_user("jane@example.com", None)).unwrap();
        let session = login(&conn, "jane@example.com", "correct horse", 12).unwrap();

        set_active(&conn, &admin, &patient.id, false).unwrap();
        assert!(authenticate(&conn, &session.token).is_err());
        assert!(matches!(
            login(&conn, "jane@example.com", "correct horse", 12),
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[test]
    fn change_password_requires_current() {
        let conn = open_memory_database().unwrap();
        let patient = register_patient(&conn, new_user("jane@example.com", None)).unwrap();
        assert!(matches!(
            change_password(&conn, &patient.id, "nope", "new secret pass"),
            Err(AccountError::WrongPassword)
        ));
        change_password(&conn, &patient.id, "correct horse", "new secret pass").unwrap();
        assert!(login(&conn, "jane@example.com", "new secret pass", 1).is_ok());
    }

    #[test]
    fn change_password_revokes_current_session() {
        let conn = open_memory_database().unwrap();
        let patient = register_patient(&conn, new_user("jane@example.com", None)).unwrap();
        let current = login(&conn, "jane@example.com", "correct horse", 1).unwrap();
        let other = login(&conn, "jane@example.com", "correct horse", 1).unwrap();

        change_password(&conn, &patient.id, "correct horse", "new secret pass").unwrap();
        assert!(authenticate(&conn, &current.token).is_err());
        assert!(authenticate(&conn, &other.token).is_err());
    }

    #[test]
    fn update_profile_keeps_unset_fields() {
        let conn = open_memory_database().unwrap();
        let mut new = new_user("jane@example.com", None);
        new.phone = Some("555-0100".into());
        let patient = register_patient(&conn, new).unwrap();

        let updated = update_profile(
            &conn,
            &patient.id,
            ProfileUpdate {
                full_name: Some("Jane Q. Doe".into()),
                ..ProfileUpdate::default()
            },
        )
        .unwrap();
        assert_eq!(updated.full_name, "Jane Q. Doe");
        assert_eq!(updated.phone.as_deref(), Some("555-0100"));
    }

    #[test]
    fn bootstrap_admin_only_once() {
        let conn = open_memory_database().unwrap();
        assert!(ensure_bootstrap_admin(&conn, "root@clinic.test", "change-me-now")
            .unwrap()
            .is_some());
        assert!(ensure_bootstrap_admin(&conn, "other@clinic.test", "change-me-now")
            .unwrap()
            .is_none());
    }
}
