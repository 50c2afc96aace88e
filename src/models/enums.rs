use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form is shared by the database column and the JSON wire format.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub const ALL: &'static [$name] = &[$(Self::$variant),+];
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Role {
    Patient => "PATIENT",
    Doctor => "DOCTOR",
    Pharmacy => "PHARMACY",
    Admin => "ADMIN",
});

str_enum!(AppointmentMode {
    Online => "ONLINE",
    Offline => "OFFLINE",
});

str_enum!(AppointmentStatus {
    Pending => "PENDING",
    Confirmed => "CONFIRMED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    NoShow => "NO_SHOW",
});

str_enum!(PrescriptionStatus {
    Issued => "ISSUED",
    SentToPharmacy => "SENT_TO_PHARMACY",
    ReceivedByPharmacy => "RECEIVED_BY_PHARMACY",
    PharmacyAccepted => "PHARMACY_ACCEPTED",
    Processing => "PROCESSING",
    ReadyForPickup => "READY_FOR_PICKUP",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

str_enum!(NotificationKind {
    Appointment => "APPOINTMENT",
    Prescription => "PRESCRIPTION",
    Inventory => "INVENTORY",
    System => "SYSTEM",
});

str_enum!(AlertSeverity {
    Info => "INFO",
    Warning => "WARNING",
    Critical => "CRITICAL",
});

impl AppointmentStatus {
    /// Statuses that still occupy the doctor's calendar.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

impl PrescriptionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Stock has been taken from the pharmacy shelf in these states.
    pub fn holds_stock(&self) -> bool {
        matches!(self, Self::Processing | Self::ReadyForPickup)
    }

    /// Human-readable label used in notification text.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::SentToPharmacy => "sent to pharmacy",
            Self::ReceivedByPharmacy => "received by pharmacy",
            Self::PharmacyAccepted => "accepted by pharmacy",
            Self::Processing => "being prepared",
            Self::ReadyForPickup => "ready for pickup",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}
