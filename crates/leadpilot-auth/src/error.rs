//! Session store error types.

use leadpilot_core::error::LeadpilotError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("email address is already confirmed")]
    AlreadyConfirmed,

    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("invalid email address")]
    InvalidEmail,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for LeadpilotError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_) => LeadpilotError::AuthenticationFailed {
                reason: err.to_string(),
            },
            AuthError::WeakPassword { .. } | AuthError::InvalidEmail => {
                LeadpilotError::validation(err.to_string())
            }
            AuthError::AlreadyConfirmed => LeadpilotError::InvalidTransition {
                reason: err.to_string(),
            },
            AuthError::Crypto(msg) => LeadpilotError::Internal(msg),
        }
    }
}
