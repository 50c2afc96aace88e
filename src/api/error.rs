//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::accounts::AccountError;
use crate::appointment::AppointmentError;
use crate::authorization::AuthorizationError;
use crate::core_state::CoreError;
use crate::crypto::CryptoError;
use crate::db::DatabaseError;
use crate::departments::DepartmentError;
use crate::inventory::InventoryError;
use crate::medications::MedicationError;
use crate::notifications::NotificationError;
use crate::prescription::PrescriptionError;
use crate::system_alerts::SystemAlertError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required: {0}")]
    Unauthorized(String),
    #[error("Session expired")]
    SessionExpired,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthenticated() -> Self {
        ApiError::Unauthorized("Authentication required".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized(detail) => {
                (StatusCode::UNAUTHORIZED, "AUTH_REQUIRED", detail.clone())
            }
            ApiError::SessionExpired => (
                StatusCode::UNAUTHORIZED,
                "SESSION_EXPIRED",
                "Session expired, log in again".to_string(),
            ),
            ApiError::Forbidden(detail) => (StatusCode::FORBIDDEN, "FORBIDDEN", detail.clone()),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail.clone()),
            ApiError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Rate limit exceeded. Retry after {retry_after}s"),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = &self {
            if let Ok(val) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", val);
            }
        }
        response
    }
}

// ═══════════════════════════════════════════════════════════
// Conversions from domain errors
// ═══════════════════════════════════════════════════════════

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Database(e) => e.into(),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, .. } => {
                ApiError::NotFound(format!("{entity_type} not found"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(err: AuthorizationError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Database(e) => e.into(),
            AccountError::Crypto(CryptoError::WeakPassword(_)) => ApiError::BadRequest(err.to_string()),
            AccountError::Crypto(e) => ApiError::Internal(e.to_string()),
            AccountError::Forbidden(e) => e.into(),
            AccountError::InvalidCredentials | AccountError::InvalidSession => {
                ApiError::Unauthorized(err.to_string())
            }
            AccountError::SessionExpired => ApiError::SessionExpired,
            AccountError::EmailTaken => ApiError::Conflict(err.to_string()),
            AccountError::NotFound => ApiError::NotFound(err.to_string()),
            AccountError::InvalidEmail
            | AccountError::Validation(_)
            | AccountError::WrongPassword => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<DepartmentError> for ApiError {
    fn from(err: DepartmentError) -> Self {
        match err {
            DepartmentError::Database(e) => e.into(),
            DepartmentError::Forbidden(e) => e.into(),
            DepartmentError::NotFound => ApiError::NotFound(err.to_string()),
            DepartmentError::EmptyName => ApiError::BadRequest(err.to_string()),
            DepartmentError::DuplicateName | DepartmentError::HasDoctors(_) => {
                ApiError::Conflict(err.to_string())
            }
        }
    }
}

impl From<AppointmentError> for ApiError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Database(e) => e.into(),
            AppointmentError::Forbidden(e) => e.into(),
            AppointmentError::NotFound => ApiError::NotFound(err.to_string()),
            AppointmentError::NotAPatient => ApiError::Forbidden(err.to_string()),
            AppointmentError::DoctorUnavailable
            | AppointmentError::InPast
            | AppointmentError::InvalidDuration(_)
            | AppointmentError::Misaligned
            | AppointmentError::OutsideClinicHours => ApiError::BadRequest(err.to_string()),
            AppointmentError::DoctorConflict
            | AppointmentError::PatientConflict
            | AppointmentError::InvalidTransition { .. }
            | AppointmentError::Conflict => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<PrescriptionError> for ApiError {
    fn from(err: PrescriptionError) -> Self {
        match err {
            PrescriptionError::Database(e) => e.into(),
            PrescriptionError::Forbidden(e) => e.into(),
            PrescriptionError::Inventory(e) => e.into(),
            PrescriptionError::NotFound | PrescriptionError::AppointmentNotFound => {
                ApiError::NotFound(err.to_string())
            }
            PrescriptionError::NoMedications
            | PrescriptionError::InvalidMedication(_)
            | PrescriptionError::PharmacyUnavailable
            | PrescriptionError::PharmacyRequired => ApiError::BadRequest(err.to_string()),
            PrescriptionError::AppointmentNotEligible(_)
            | PrescriptionError::InvalidTransition { .. }
            | PrescriptionError::Conflict
            | PrescriptionError::InsufficientStock { .. } => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Database(e) => e.into(),
            InventoryError::Forbidden(e) => e.into(),
            InventoryError::Alert(e) => e.into(),
            InventoryError::NotFound => ApiError::NotFound(err.to_string()),
            InventoryError::NotAPharmacy => ApiError::Forbidden(err.to_string()),
            InventoryError::Validation(_) => ApiError::BadRequest(err.to_string()),
            InventoryError::Duplicate(_) | InventoryError::InsufficientStock { .. } => {
                ApiError::Conflict(err.to_string())
            }
        }
    }
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::Database(e) => e.into(),
            NotificationError::NotFound => ApiError::NotFound(err.to_string()),
        }
    }
}

impl From<SystemAlertError> for ApiError {
    fn from(err: SystemAlertError) -> Self {
        match err {
            SystemAlertError::Database(e) => e.into(),
            SystemAlertError::Forbidden(e) => e.into(),
            SystemAlertError::NotFound => ApiError::NotFound(err.to_string()),
            SystemAlertError::EmptyMessage => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<MedicationError> for ApiError {
    fn from(err: MedicationError) -> Self {
        match err {
            MedicationError::Database(e) => e.into(),
            MedicationError::Forbidden(e) => e.into(),
            MedicationError::EmptyName => ApiError::BadRequest(err.to_string()),
        }
    }
}
