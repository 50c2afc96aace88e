//! Opaque session bearer tokens. Only the SHA-256 of a token is stored.

use base64::Engine;
use sha2::{Digest, Sha256};

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex-encoded SHA-256 of a bearer token, used as the sessions key.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
