//! SurrealDB implementation of [`VerificationRepository`].

use chrono::{DateTime, Utc};
use leadpilot_core::error::LeadpilotResult;
use leadpilot_core::models::session::{
    CreateEmailVerification, EmailVerification, VerificationKind,
};
use leadpilot_core::repository::VerificationRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_uuid, query_failed};

#[derive(Debug, SurrealValue)]
struct VerificationRow {
    principal_id: String,
    kind: String,
    token_hash: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct VerificationRowWithId {
    record_id: String,
    principal_id: String,
    kind: String,
    token_hash: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl VerificationRowWithId {
    fn try_into_verification(self) -> Result<EmailVerification, DbError> {
        let kind = VerificationKind::parse(&self.kind)
            .ok_or_else(|| DbError::Decode(format!("unknown verification kind: {}", self.kind)))?;
        Ok(EmailVerification {
            id: parse_uuid(&self.record_id, "verification")?,
            principal_id: parse_uuid(&self.principal_id, "principal")?,
            kind,
            token_hash: self.token_hash,
            expires_at: self.expires_at,
            created_at: self.created_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealVerificationRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealVerificationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> VerificationRepository for SurrealVerificationRepository<C> {
    async fn create(&self, input: CreateEmailVerification) -> LeadpilotResult<EmailVerification> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('email_verification', $id) SET \
                 principal_id = $principal_id, kind = $kind, \
                 token_hash = $token_hash, expires_at = $expires_at",
            )
            .bind(("id", id_str.clone()))
            .bind(("principal_id", input.principal_id.to_string()))
            .bind(("kind", input.kind.as_str().to_string()))
            .bind(("token_hash", input.token_hash))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| query_failed("email_verification", e))?;

        let rows: Vec<VerificationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "email_verification".into(),
            id: id_str.clone(),
        })?;

        VerificationRowWithId {
            record_id: id_str,
            principal_id: row.principal_id,
            kind: row.kind,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
        .try_into_verification()
        .map_err(Into::into)
    }

    async fn consume(
        &self,
        token_hash: &str,
        kind: VerificationKind,
    ) -> LeadpilotResult<EmailVerification> {
        let not_found = || DbError::NotFound {
            entity: "email_verification".into(),
            id: "token_hash=<redacted>".into(),
        };

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM email_verification \
                 WHERE token_hash = $token_hash AND kind = $kind",
            )
            .bind(("token_hash", token_hash.to_string()))
            .bind(("kind", kind.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<VerificationRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(not_found)?;

        // Only the caller whose DELETE observed the record wins; a
        // concurrent consumer gets an empty RETURN BEFORE.
        let mut deleted = self
            .db
            .query("DELETE type::record('email_verification', $id) RETURN BEFORE")
            .bind(("id", row.record_id.clone()))
            .await
            .map_err(DbError::from)?;
        let before: Vec<VerificationRow> = deleted.take(0).map_err(DbError::from)?;
        if before.is_empty() {
            return Err(not_found().into());
        }

        row.try_into_verification().map_err(Into::into)
    }

    async fn invalidate_for_principal(
        &self,
        principal_id: Uuid,
        kind: VerificationKind,
    ) -> LeadpilotResult<()> {
        self.db
            .query(
                "DELETE email_verification \
                 WHERE principal_id = $principal_id AND kind = $kind",
            )
            .bind(("principal_id", principal_id.to_string()))
            .bind(("kind", kind.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }
}
