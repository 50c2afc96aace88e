//! Password hashing: PBKDF2-HMAC-SHA256 with a per-user random salt.
//!
//! Stored form: `pbkdf2$<iterations>$<salt_b64>$<hash_b64>`. The iteration
//! count travels with the hash so it can be raised without invalidating
//! existing accounts.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::CryptoError;

#[cfg(not(test))]
pub const PBKDF2_ITERATIONS: u32 = 600_000;
#[cfg(test)]
pub const PBKDF2_ITERATIONS: u32 = 1_000;

pub const HASH_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 16;
pub const MIN_PASSWORD_LENGTH: usize = 8;

const SCHEME: &str = "pbkdf2";

/// Reject passwords shorter than the policy minimum.
pub fn check_password_policy(password: &str) -> Result<(), CryptoError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(CryptoError::WeakPassword(MIN_PASSWORD_LENGTH));
    }
    Ok(())
}

/// Hash a password for storage. Enforces the password policy.
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    check_password_policy(password)?;
    let salt = generate_salt();
    let hash = derive(password, &salt, PBKDF2_ITERATIONS);
    Ok(format!(
        "{SCHEME}${PBKDF2_ITERATIONS}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    ))
}

/// Verify a password against its stored form in constant time.
/// A malformed stored hash never verifies.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    match decode(encoded) {
        Ok((iterations, salt, expected)) => {
            let actual = derive(password, &salt, iterations);
            actual.as_slice().ct_eq(expected.as_slice()).into()
        }
        Err(_) => false,
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

fn decode(encoded: &str) -> Result<(u32, Vec<u8>, Vec<u8>), CryptoError> {
    let mut parts = encoded.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(CryptoError::MalformedHash);
    };

    let iterations: u32 = iterations.parse().map_err(|_| CryptoError::MalformedHash)?;
    if iterations == 0 {
        return Err(CryptoError::MalformedHash);
    }
    let salt = STANDARD_NO_PAD
        .decode(salt)
        .map_err(|_| CryptoError::MalformedHash)?;
    let hash = STANDARD_NO_PAD
        .decode(hash)
        .map_err(|_| CryptoError::MalformedHash)?;
    if hash.len() != HASH_LENGTH {
        return Err(CryptoError::MalformedHash);
    }
    Ok((iterations, salt, hash))
}

/// Generate a cryptographically random salt
fn generate_salt() -> [u8; SALT_LENGTH] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
