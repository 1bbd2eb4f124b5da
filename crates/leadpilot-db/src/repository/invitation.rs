//! Invitation rows. Written through the membership repository.

use chrono::{DateTime, Utc};
use leadpilot_core::models::invitation::{CreateInvitation, DeliveryStatus, Invitation};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::membership::parse_role;
use crate::error::{DbError, parse_uuid, query_failed};

#[derive(Debug, SurrealValue)]
struct InvitationRow {
    organization_id: String,
    email: String,
    role: String,
    invited_by: String,
    delivery: String,
    created_at: DateTime<Utc>,
}

impl InvitationRow {
    fn into_invitation(self, id: Uuid) -> Result<Invitation, DbError> {
        let delivery = DeliveryStatus::parse(&self.delivery)
            .ok_or_else(|| DbError::Decode(format!("unknown delivery status: {}", self.delivery)))?;
        Ok(Invitation {
            id,
            organization_id: parse_uuid(&self.organization_id, "organization")?,
            email: self.email,
            role: parse_role(&self.role)?,
            invited_by: parse_uuid(&self.invited_by, "principal")?,
            delivery,
            created_at: self.created_at,
        })
    }
}

pub(crate) async fn create<C: Connection>(
    db: &Surreal<C>,
    input: CreateInvitation,
) -> Result<Invitation, DbError> {
    let id = Uuid::new_v4();
    let id_str = id.to_string();
    let email = input.email.trim().to_lowercase();

    let mut existing = db
        .query(
            "SELECT VALUE meta::id(id) FROM invitation \
             WHERE organization_id = $organization_id AND email = $email",
        )
        .bind(("organization_id", input.organization_id.to_string()))
        .bind(("email", email.clone()))
        .await?;
    let existing: Vec<String> = existing.take(0)?;
    if !existing.is_empty() {
        return Err(DbError::Conflict {
            entity: "invitation".into(),
        });
    }

    let result = db
        .query(
            "CREATE type::record('invitation', $id) SET \
             organization_id = $organization_id, email = $email, \
             role = $role, invited_by = $invited_by, \
             delivery = 'pending_integration'",
        )
        .bind(("id", id_str.clone()))
        .bind(("organization_id", input.organization_id.to_string()))
        .bind(("email", email))
        .bind(("role", input.role.as_str().to_string()))
        .bind(("invited_by", input.invited_by.to_string()))
        .await?;
    let mut result = result.check().map_err(|e| query_failed("invitation", e))?;

    let rows: Vec<InvitationRow> = result.take(0)?;
    let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
        entity: "invitation".into(),
        id: id_str,
    })?;

    row.into_invitation(id)
}
