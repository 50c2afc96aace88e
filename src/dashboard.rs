//! Role-specific landing summaries.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::{self, repository, DatabaseError};
use crate::models::enums::{AppointmentStatus, PrescriptionStatus, Role};
use crate::models::{Appointment, AppointmentFilter, Prescription, PrescriptionFilter, SystemAlert, User};

const UPCOMING_LIMIT: usize = 5;
const RECENT_ALERTS_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Dashboard {
    Patient(PatientDashboard),
    Doctor(DoctorDashboard),
    Pharmacy(PharmacyDashboard),
    Admin(AdminDashboard),
}

#[derive(Debug, Serialize)]
pub struct PatientDashboard {
    pub upcoming_appointments: Vec<Appointment>,
    pub active_prescriptions: Vec<Prescription>,
    pub unread_notifications: i64,
}

#[derive(Debug, Serialize)]
pub struct DoctorDashboard {
    pub todays_appointments: Vec<Appointment>,
    pub pending_confirmations: Vec<Appointment>,
    pub prescriptions_issued_this_week: i64,
    pub unread_notifications: i64,
}

#[derive(Debug, Serialize)]
pub struct PharmacyDashboard {
    /// Sent to this pharmacy but not yet acknowledged.
    pub incoming: i64,
    /// Received, accepted or being prepared.
    pub in_progress: i64,
    pub ready_for_pickup: i64,
    pub low_stock_items: i64,
    pub unread_notifications: i64,
}

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub users_by_role: BTreeMap<String, i64>,
    pub appointments_by_status: BTreeMap<String, i64>,
    pub prescriptions_by_status: BTreeMap<String, i64>,
    pub active_alerts: i64,
    pub recent_alerts: Vec<SystemAlert>,
}

pub fn for_user(conn: &Connection, user: &User) -> Result<Dashboard, DatabaseError> {
    let now = db::now();
    Ok(match user.role {
        Role::Patient => Dashboard::Patient(patient(conn, user, now)?),
        Role::Doctor => Dashboard::Doctor(doctor(conn, user, now)?),
        Role::Pharmacy => Dashboard::Pharmacy(pharmacy(conn, user)?),
        Role::Admin => Dashboard::Admin(admin(conn)?),
    })
}

fn patient(conn: &Connection, user: &User, now: NaiveDateTime) -> Result<PatientDashboard, DatabaseError> {
    let filter = AppointmentFilter {
        patient_id: Some(user.id),
        date_from: Some(now.date()),
        ..AppointmentFilter::default()
    };
    let upcoming_appointments = repository::list_appointments(conn, &filter)?
        .into_iter()
        .filter(|a| a.status.is_active() && a.ends_at() > now)
        .take(UPCOMING_LIMIT)
        .collect();

    let rx_filter = PrescriptionFilter {
        patient_id: Some(user.id),
        ..PrescriptionFilter::default()
    };
    let active_prescriptions = repository::list_prescriptions(conn, &rx_filter)?
        .into_iter()
        .filter(|rx| !rx.status.is_terminal())
        .collect();

    Ok(PatientDashboard {
        upcoming_appointments,
        active_prescriptions,
        unread_notifications: repository::count_unread_notifications(conn, &user.id)?,
    })
}

fn doctor(conn: &Connection, user: &User, now: NaiveDateTime) -> Result<DoctorDashboard, DatabaseError> {
    let today = now.date();
    let todays = AppointmentFilter {
        doctor_id: Some(user.id),
        date_from: Some(today),
        date_to: Some(today),
        ..AppointmentFilter::default()
    };
    let todays_appointments = repository::list_appointments(conn, &todays)?
        .into_iter()
        .filter(|a| a.status != AppointmentStatus::Cancelled)
        .collect();

    let pending = AppointmentFilter {
        doctor_id: Some(user.id),
        status: Some(AppointmentStatus::Pending),
        date_from: Some(today),
        ..AppointmentFilter::default()
    };
    let pending_confirmations = repository::list_appointments(conn, &pending)?;

    // Weeks start on Monday.
    let week_start = (today - Duration::days(today.weekday().num_days_from_monday() as i64))
        .and_hms_opt(0, 0, 0)
        .unwrap_or(now);

    Ok(DoctorDashboard {
        todays_appointments,
        pending_confirmations,
        prescriptions_issued_this_week: repository::count_prescriptions_issued_since(conn, &user.id, &week_start)?,
        unread_notifications: repository::count_unread_notifications(conn, &user.id)?,
    })
}

fn pharmacy(conn: &Connection, user: &User) -> Result<PharmacyDashboard, DatabaseError> {
    let counts = repository::count_prescriptions_by_status(conn, Some(&user.id))?;
    let sum = |wanted: &[PrescriptionStatus]| -> i64 {
        counts
            .iter()
            .filter(|(status, _)| wanted.contains(status))
            .map(|(_, n)| n)
            .sum()
    };

    Ok(PharmacyDashboard {
        incoming: sum(&[PrescriptionStatus::SentToPharmacy]),
        in_progress: sum(&[
            PrescriptionStatus::ReceivedByPharmacy,
            PrescriptionStatus::PharmacyAccepted,
            PrescriptionStatus::Processing,
        ]),
        ready_for_pickup: sum(&[PrescriptionStatus::ReadyForPickup]),
        low_stock_items: repository::count_low_stock_items(conn, &user.id)?,
        unread_notifications: repository::count_unread_notifications(conn, &user.id)?,
    })
}

fn admin(conn: &Connection) -> Result<AdminDashboard, DatabaseError> {
    let users_by_role = repository::count_users_by_role(conn)?
        .into_iter()
        .map(|(role, n)| (role.as_str().to_string(), n))
        .collect();
    let appointments_by_status = repository::count_appointments_by_status(conn)?
        .into_iter()
        .map(|(status, n)| (status.as_str().to_string(), n))
        .collect();
    let prescriptions_by_status = repository::count_prescriptions_by_status(conn, None)?
        .into_iter()
        .map(|(status, n)| (status.as_str().to_string(), n))
        .collect();

    let mut recent_alerts = repository::list_system_alerts(conn, true)?;
    recent_alerts.truncate(RECENT_ALERTS_LIMIT);

    Ok(AdminDashboard {
        users_by_role,
        appointments_by_status,
        prescriptions_by_status,
        active_alerts: repository::count_active_system_alerts(conn)?,
        recent_alerts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::models::enums::AlertSeverity;
    use crate::system_alerts;
    use crate::test_support::{make_appointment, make_user};

    #[test]
    fn patient_sees_upcoming_active_appointments() {
        let conn = open_memory_database().unwrap();
        let patient = make_user(&conn, Role::Patient);
        let doctor = make_user(&conn, Role::Doctor);
        make_appointment(&conn, &patient, &doctor, AppointmentStatus::Confirmed);
        make_appointment(&conn, &patient, &doctor, AppointmentStatus::Cancelled);

        match for_user(&conn, &patient).unwrap() {
            Dashboard::Patient(d) => {
                assert_eq!(d.upcoming_appointments.len(), 1);
                assert!(d.active_prescriptions.is_empty());
            }
            other => panic!("unexpected dashboard {other:?}"),
        }
    }

    #[test]
    fn doctor_counts_pending_confirmations() {
        let conn = open_memory_database().unwrap();
        let patient = make_user(&conn, Role::Patient);
        let doctor = make_user(&conn, Role::Doctor);
        make_appointment(&conn, &patient, &doctor, AppointmentStatus::Pending);

        match for_user(&conn, &doctor).unwrap() {
            Dashboard::Doctor(d) => {
                assert_eq!(d.pending_confirmations.len(), 1);
                assert_eq!(d.prescriptions_issued_this_week, 0);
            }
            other => panic!("unexpected dashboard {other:?}"),
        }
    }

    #[test]
    fn admin_summary_serializes_with_role_tag() {
        let conn = open_memory_database().unwrap();
        let admin = make_user(&conn, Role::Admin);
        make_user(&conn, Role::Patient);
        make_user(&conn, Role::Patient);
        system_alerts::raise(&conn, AlertSeverity::Warning, "admin", "Disk nearly full").unwrap();

        let json = serde_json::to_value(for_user(&conn, &admin).unwrap()).unwrap();
        assert_eq!(json["role"], "ADMIN");
        assert_eq!(json["users_by_role"]["PATIENT"], 2);
        assert_eq!(json["active_alerts"], 1);
    }

    #[test]
    fn pharmacy_dashboard_starts_empty() {
        let conn = open_memory_database().unwrap();
        let pharmacy = make_user(&conn, Role::Pharmacy);
        let json = serde_json::to_value(for_user(&conn, &pharmacy).unwrap()).unwrap();
        assert_eq!(json["role"], "PHARMACY");
        assert_eq!(json["incoming"], 0);
        assert_eq!(json["low_stock_items"], 0);
    }
}
