//! Error types for the Leadpilot tenancy core.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LeadpilotError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("No organization is currently selected")]
    NoCurrentOrganization,

    #[error("Not an approved, active member of organization {organization_id}")]
    NotAMember { organization_id: Uuid },

    #[error("Organization {organization_id} must keep at least one active owner")]
    LastOwner { organization_id: Uuid },

    #[error("Invalid state transition: {reason}")]
    InvalidTransition { reason: String },

    #[error("Organizations unavailable: {reason}")]
    OrganizationsUnavailable { reason: String },

    #[error("Backend capability unavailable: {capability}")]
    CapabilityUnavailable { capability: String },

    #[error("Operation {operation} already in flight for {target}")]
    OperationInFlight { operation: String, target: Uuid },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by callers to decide how a failure is
/// surfaced (user message vs. retry prompt vs. verification screen).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Authorization,
    Invariant,
    Backend,
    Validation,
}

impl LeadpilotError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationFailed { .. } => ErrorCategory::Authentication,
            Self::AuthorizationDenied { .. } => ErrorCategory::Authorization,
            Self::NotFound { .. }
            | Self::AlreadyExists { .. }
            | Self::NoCurrentOrganization
            | Self::NotAMember { .. }
            | Self::LastOwner { .. }
            | Self::InvalidTransition { .. }
            | Self::OperationInFlight { .. } => ErrorCategory::Invariant,
            Self::OrganizationsUnavailable { .. }
            | Self::CapabilityUnavailable { .. }
            | Self::Database(_)
            | Self::Internal(_) => ErrorCategory::Backend,
            Self::Validation { .. } => ErrorCategory::Validation,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            reason: reason.into(),
        }
    }
}

pub type LeadpilotResult<T> = Result<T, LeadpilotError>;
