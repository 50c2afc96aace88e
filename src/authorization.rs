//! Role-based authorization.
//!
//! Two layers, both default-deny:
//! 1. Capability check: may this role perform this kind of action at all?
//! 2. Resource scoping: is this user a participant of this record?
//!
//! Admins pass both layers. Everyone else needs a role grant for the
//! capability and, for record-level access, a participant relation.

use crate::models::enums::Role;
use crate::models::{Appointment, Prescription, User};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Capabilities exposed through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ManageDepartments,
    ManageUsers,
    BookAppointment,
    ConfirmAppointment,
    CompleteAppointment,
    CancelAppointment,
    RescheduleAppointment,
    IssuePrescription,
    RoutePrescription,
    ProcessPrescription,
    CancelPrescription,
    ManageInventory,
    ManageSystemAlerts,
    ViewAuditLog,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManageDepartments => "manage_departments",
            Self::ManageUsers => "manage_users",
            Self::BookAppointment => "book_appointment",
            Self::ConfirmAppointment => "confirm_appointment",
            Self::CompleteAppointment => "complete_appointment",
            Self::CancelAppointment => "cancel_appointment",
            Self::RescheduleAppointment => "reschedule_appointment",
            Self::IssuePrescription => "issue_prescription",
            Self::RoutePrescription => "route_prescription",
            Self::ProcessPrescription => "process_prescription",
            Self::CancelPrescription => "cancel_prescription",
            Self::ManageInventory => "manage_inventory",
            Self::ManageSystemAlerts => "manage_system_alerts",
            Self::ViewAuditLog => "view_audit_log",
        }
    }
}

/// Why access was granted (or denied): for audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    /// Administrator override.
    Admin,
    /// The role holds the capability.
    RoleGrant,
    /// The user is a party to the record.
    Participant,
    /// No matching rule.
    Denied,
}

/// Result of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn allow(reason: AccessReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny() -> Self {
        Self {
            allowed: false,
            reason: AccessReason::Denied,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error("{role} may not {action}")]
    Forbidden { role: Role, action: &'static str },
    #[error("Not a participant of this {0}")]
    NotParticipant(&'static str),
}

// ═══════════════════════════════════════════════════════════
// Capability table
// ═══════════════════════════════════════════════════════════

/// Does `role` hold `action`? Admin holds everything.
pub fn permits(role: Role, action: Action) -> bool {
    use Action::*;
    match role {
        Role::Admin => true,
        Role::Patient => matches!(
            action,
            BookAppointment | CancelAppointment | RescheduleAppointment | RoutePrescription
        ),
        Role::Doctor => matches!(
            action,
            ConfirmAppointment
                | CompleteAppointment
                | CancelAppointment
                | RescheduleAppointment
                | IssuePrescription
                | RoutePrescription
                | CancelPrescription
        ),
        Role::Pharmacy => matches!(
            action,
            ProcessPrescription | CancelPrescription | ManageInventory
        ),
    }
}

pub fn check(user: &User, action: Action) -> AccessDecision {
    if user.is_admin() {
        AccessDecision::allow(AccessReason::Admin)
    } else if permits(user.role, action) {
        AccessDecision::allow(AccessReason::RoleGrant)
    } else {
        AccessDecision::deny()
    }
}

/// Capability check as a `Result`, for `?` in service code.
pub fn require(user: &User, action: Action) -> Result<AccessReason, AuthorizationError> {
    let decision = check(user, action);
    if decision.allowed {
        Ok(decision.reason)
    } else {
        tracing::debug!(user_id = %user.id, action = action.as_str(), "Capability denied");
        Err(AuthorizationError::Forbidden {
            role: user.role,
            action: action.as_str(),
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Resource scoping
// ═══════════════════════════════════════════════════════════

/// Patient and doctor of the appointment, or an admin.
pub fn can_view_appointment(user: &User, appt: &Appointment) -> AccessDecision {
    if user.is_admin() {
        return AccessDecision::allow(AccessReason::Admin);
    }
    if appt.involves(&user.id) {
        return AccessDecision::allow(AccessReason::Participant);
    }
    AccessDecision::deny()
}

/// Patient, issuing doctor, the pharmacy it was routed to, or an admin.
pub fn can_view_prescription(user: &User, rx: &Prescription) -> AccessDecision {
    if user.is_admin() {
        return AccessDecision::allow(AccessReason::Admin);
    }
    let participant = match user.role {
        Role::Patient => rx.patient_id == user.id,
        Role::Doctor => rx.doctor_id == user.id,
        Role::Pharmacy => rx.pharmacy_id == Some(user.id),
        Role::Admin => true,
    };
    if participant {
        AccessDecision::allow(AccessReason::Participant)
    } else {
        AccessDecision::deny()
    }
}

pub fn require_appointment_access(user: &User, appt: &Appointment) -> Result<(), AuthorizationError> {
    if can_view_appointment(user, appt).allowed {
        Ok(())
    } else {
        Err(AuthorizationError::NotParticipant("appointment"))
    }
}

pub fn require_prescription_access(user: &User, rx: &Prescription) -> Result<(), AuthorizationError> {
    if can_view_prescription(user, rx).allowed {
        Ok(())
    } else {
        Err(AuthorizationError::NotParticipant("prescription"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now;
    use crate::models::enums::{AppointmentMode, AppointmentStatus, PrescriptionStatus};
    use uuid::Uuid;

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: format!("{}@example.com", role.as_str().to_lowercase()),
            full_name: "Test".into(),
            role,
            phone: None,
            is_active: true,
            created_at: now(),
            department_id: None,
            specialization: None,
            license_number: None,
            pharmacy_name: None,
            address: None,
            date_of_birth: None,
        }
    }

    fn appointment(patient: &User, doctor: &User) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            doctor_id: doctor.id,
            scheduled_at: now(),
            duration_minutes: 30,
            mode: AppointmentMode::Online,
            status: AppointmentStatus::Pending,
            reason: None,
            notes: None,
            meeting_link: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn prescription(patient: &User, doctor: &User, pharmacy: Option<&User>) -> Prescription {
        Prescription {
            id: Uuid::new_v4(),
            appointment_id: Uuid::new_v4(),
            patient_id: patient.id,
            doctor_id: doctor.id,
            pharmacy_id: pharmacy.map(|p| p.id),
            status: PrescriptionStatus::Issued,
            diagnosis: None,
            notes: None,
            version: 0,
            stock_reserved: false,
            issued_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn admin_holds_every_capability() {
        let admin = user(Role::Admin);
        assert_eq!(require(&admin, Action::ViewAuditLog).unwrap(), AccessReason::Admin);
        assert!(check(&admin, Action::ManageInventory).allowed);
    }

    #[test]
    fn patient_cannot_issue_prescriptions() {
        let patient = user(Role::Patient);
        assert!(require(&patient, Action::IssuePrescription).is_err());
        assert!(require(&patient, Action::BookAppointment).is_ok());
    }

    #[test]
    fn only_pharmacy_processes_prescriptions() {
        assert!(permits(Role::Pharmacy, Action::ProcessPrescription));
        assert!(!permits(Role::Doctor, Action::ProcessPrescription));
        assert!(!permits(Role::Patient, Action::ProcessPrescription));
    }

    #[test]
    fn doctor_cannot_manage_inventory() {
        assert!(!permits(Role::Doctor, Action::ManageInventory));
        assert!(!permits(Role::Patient, Action::ManageUsers));
    }

    #[test]
    fn appointment_visible_to_participants_only() {
        let patient = user(Role::Patient);
        let doctor = user(Role::Doctor);
        let stranger = user(Role::Doctor);
        let appt = appointment(&patient, &doctor);

        assert_eq!(can_view_appointment(&patient, &appt).reason, AccessReason::Participant);
        assert!(can_view_appointment(&doctor, &appt).allowed);
        assert!(!can_view_appointment(&stranger, &appt).allowed);
        assert!(can_view_appointment(&user(Role::Admin), &appt).allowed);
    }

    #[test]
    fn prescription_visible_to_routed_pharmacy() {
        let patient = user(Role::Patient);
        let doctor = user(Role::Doctor);
        let pharmacy = user(Role::Pharmacy);
        let other_pharmacy = user(Role::Pharmacy);

        let unrouted = prescription(&patient, &doctor, None);
        assert!(!can_view_prescription(&pharmacy, &unrouted).allowed);

        let routed = prescription(&patient, &doctor, Some(&pharmacy));
        assert!(can_view_prescription(&pharmacy, &routed).allowed);
        assert!(!can_view_prescription(&other_pharmacy, &routed).allowed);
        assert!(require_prescription_access(&patient, &routed).is_ok());
    }
}
