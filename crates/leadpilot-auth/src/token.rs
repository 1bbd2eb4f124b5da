//! Opaque session and verification tokens.
//!
//! Raw tokens are handed to the caller once; only their SHA-256 digest is
//! stored.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use leadpilot_core::models::session::VerificationKind;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A verification code to deliver out of band (email link). The raw
/// `token` is not stored anywhere.
#[derive(Debug, Clone)]
pub struct VerificationTicket {
    pub principal_id: Uuid,
    pub kind: VerificationKind,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl VerificationTicket {
    /// The value the confirmation link carries as `token_hash`.
    pub fn token_hash(&self) -> String {
        hash_token(&self.token)
    }
}

/// 32 random bytes, base64url-encoded without padding.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex-encoded SHA-256 of a raw token.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
