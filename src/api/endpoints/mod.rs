//! API endpoint handlers.
//!
//! One module per resource. Handlers stay thin: open a connection,
//! call the domain module, wrap the result in a resource-named body.

pub mod admin;
pub mod appointments;
pub mod auth;
pub mod dashboard;
pub mod departments;
pub mod doctors;
pub mod health;
pub mod inventory;
pub mod me;
pub mod medications;
pub mod notifications;
pub mod pharmacies;
pub mod prescriptions;
