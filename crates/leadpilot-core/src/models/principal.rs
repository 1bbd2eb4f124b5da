//! Principal domain model.
//!
//! A principal is an authenticated identity. It is created on sign-up and
//! gains its `email_confirmed_at` timestamp once an emailed one-time code
//! has been verified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    /// Argon2id PHC string. Never serialized out of the backend.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub metadata: serde_json::Value,
    pub email_confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    pub fn is_email_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrincipal {
    pub email: String,
    /// Raw password (hashed with Argon2id before storage).
    pub password: String,
    pub display_name: Option<String>,
    pub metadata: Option<serde_json::Value>,
}
