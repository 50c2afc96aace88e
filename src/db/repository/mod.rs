//! Repository layer: entity-scoped database operations.
//!
//! One sub-module per table group. Functions take a borrowed
//! `Connection` (or `Transaction`, which derefs to one) so callers
//! decide the transaction boundary.

mod appointment;
mod audit;
mod department;
mod inventory;
mod medication;
mod notification;
mod prescription;
mod session;
mod system_alert;
mod user;

pub use appointment::*;
pub use audit::*;
pub use department::*;
pub use inventory::*;
pub use medication::*;
pub use notification::*;
pub use prescription::*;
pub use session::*;
pub use system_alert::*;
pub use user::*;

/// `LIKE` pattern matching `term` anywhere, for use with `ESCAPE '\'`.
/// `%`, `_` and the backslash itself in `term` match literally.
fn contains_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
