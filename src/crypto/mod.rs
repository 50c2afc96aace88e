pub mod password;
pub mod token;

pub use password::*;
pub use token::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("Malformed password hash")]
    MalformedHash,
}
