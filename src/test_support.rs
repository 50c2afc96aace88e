//! Fixtures shared by unit tests across modules.

use chrono::{Duration, NaiveDateTime, Timelike};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, repository};
use crate::models::enums::{AppointmentMode, AppointmentStatus, Role};
use crate::models::{Appointment, Department, User};

/// Insert a user with a throwaway password hash.
pub fn make_user(conn: &Connection, role: Role) -> User {
    let user = User {
        id: Uuid::new_v4(),
        email: format!("{}@example.com", Uuid::new_v4().simple()),
        full_name: format!("Test {}", role.as_str().to_lowercase()),
        role,
        phone: None,
        is_active: true,
        created_at: db::now(),
        department_id: None,
        specialization: (role == Role::Doctor).then(|| "General practice".to_string()),
        license_number: (role == Role::Doctor || role == Role::Pharmacy).then(|| "LIC-1".to_string()),
        pharmacy_name: (role == Role::Pharmacy).then(|| "Corner Pharmacy".to_string()),
        address: (role == Role::Pharmacy).then(|| "1 Main St".to_string()),
        date_of_birth: None,
    };
    repository::insert_user(conn, &user, "pbkdf2$1$c2FsdA$aGFzaA").unwrap();
    user
}

pub fn make_department(conn: &Connection, name: &str) -> Department {
    let dept = Department {
        id: Uuid::new_v4(),
        name: name.into(),
        description: None,
        created_at: db::now(),
    };
    repository::insert_department(conn, &dept).unwrap();
    dept
}

/// Tomorrow at `hour:00` UTC.
pub fn tomorrow_at(hour: u32) -> NaiveDateTime {
    (db::now() + Duration::days(1))
        .with_hour(hour)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .unwrap()
}

/// Insert an appointment directly in `status`, bypassing booking rules.
pub fn make_appointment(
    conn: &Connection,
    patient: &User,
    doctor: &User,
    status: AppointmentStatus,
) -> Appointment {
    let appt = Appointment {
        id: Uuid::new_v4(),
        patient_id: patient.id,
        doctor_id: doctor.id,
        scheduled_at: tomorrow_at(10),
        duration_minutes: 30,
        mode: AppointmentMode::Offline,
        status,
        reason: Some("Checkup".into()),
        notes: None,
        meeting_link: None,
        created_at: db::now(),
        updated_at: db::now(),
    };
    repository::insert_appointment(conn, &appt).unwrap();
    appt
}
