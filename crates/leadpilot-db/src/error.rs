//! Database-specific error types and conversions.

use std::collections::HashMap;

use leadpilot_core::error::LeadpilotError;
use uuid::Uuid;

/// Thrown inside a membership transaction that would leave an
/// organization without an active owner.
pub(crate) const LAST_OWNER_MARKER: &str = "last_owner";

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Malformed row: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Unique constraint violated on {entity}")]
    Conflict { entity: String },
}

impl From<DbError> for LeadpilotError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => LeadpilotError::NotFound { entity, id },
            DbError::Conflict { entity } => LeadpilotError::AlreadyExists { entity },
            other => LeadpilotError::Database(other.to_string()),
        }
    }
}

/// Classify a failed statement. Unique index violations become
/// [`DbError::Conflict`].
pub(crate) fn query_failed(entity: &str, err: surrealdb::Error) -> DbError {
    let message = err.to_string();
    if message.contains("already contains") {
        DbError::Conflict {
            entity: entity.to_string(),
        }
    } else {
        DbError::Query(message)
    }
}

/// Classify the errors of a failed membership transaction.
///
/// Once a transaction fails every statement reports an error, and the
/// first one is usually the generic "not executed" notice. The thrown
/// marker is searched across all of them before falling back to the
/// earliest failure. A commit that lost a race against another roster
/// transaction on the same organization is reported as in flight.
pub(crate) fn membership_transaction_failed(
    organization_id: Uuid,
    errors: HashMap<usize, surrealdb::Error>,
) -> LeadpilotError {
    let messages: Vec<String> = errors.values().map(ToString::to_string).collect();
    if messages.iter().any(|m| m.contains(LAST_OWNER_MARKER)) {
        return LeadpilotError::LastOwner { organization_id };
    }
    if messages.iter().any(|m| m.to_lowercase().contains("conflict")) {
        return LeadpilotError::OperationInFlight {
            operation: "membership_mutation".into(),
            target: organization_id,
        };
    }
    match errors.into_iter().min_by_key(|(index, _)| *index) {
        Some((_, err)) => query_failed("user_organization", err).into(),
        None => LeadpilotError::Database("membership transaction failed".into()),
    }
}

/// Classify a failed RPC call. A call to an undefined `fn::` function is a
/// missing capability, which callers may decide to tolerate.
pub(crate) fn rpc_failed(capability: &str, err: surrealdb::Error) -> LeadpilotError {
    let message = err.to_string();
    if is_missing_function(&message) {
        LeadpilotError::CapabilityUnavailable {
            capability: capability.to_string(),
        }
    } else {
        LeadpilotError::Database(message)
    }
}

fn is_missing_function(message: &str) -> bool {
    message.contains("fn::") && (message.contains("does not exist") || message.contains("not found"))
}

pub(crate) fn parse_uuid(value: &str, what: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Decode(format!("invalid {what} UUID: {e}")))
}
