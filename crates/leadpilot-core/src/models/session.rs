//! Session and email-verification models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A signed-in session. Only the SHA-256 digest of the bearer token is
/// kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateSession {
    pub principal_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// What a one-time emailed code is allowed to prove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    Signup,
    Invite,
    MagicLink,
    Recovery,
    EmailChange,
}

impl VerificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Invite => "invite",
            Self::MagicLink => "magiclink",
            Self::Recovery => "recovery",
            Self::EmailChange => "email_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "signup" => Some(Self::Signup),
            "invite" => Some(Self::Invite),
            "magiclink" => Some(Self::MagicLink),
            "recovery" => Some(Self::Recovery),
            "email_change" => Some(Self::EmailChange),
            _ => None,
        }
    }

    /// Whether a successful verification of this kind proves ownership of
    /// the address and so confirms the principal's email.
    pub fn confirms_email(&self) -> bool {
        !matches!(self, Self::Recovery)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailVerification {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub kind: VerificationKind,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateEmailVerification {
    pub principal_id: Uuid,
    pub kind: VerificationKind,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}
