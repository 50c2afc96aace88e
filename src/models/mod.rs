pub mod alert;
pub mod appointment;
pub mod department;
pub mod enums;
pub mod filters;
pub mod inventory;
pub mod medication;
pub mod notification;
pub mod prescription;
pub mod user;

pub use alert::*;
pub use appointment::*;
pub use department::*;
pub use filters::*;
pub use inventory::*;
pub use medication::*;
pub use notification::*;
pub use prescription::*;
pub use user::*;
