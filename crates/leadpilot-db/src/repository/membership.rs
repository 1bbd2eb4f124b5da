//! SurrealDB implementation of [`MembershipRepository`].
//!
//! Memberships live in the `user_organization` table, one row per
//! (principal, organization) pair.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use leadpilot_core::error::LeadpilotResult;
use leadpilot_core::models::invitation::{CreateInvitation, Invitation};
use leadpilot_core::models::membership::{
    ApprovalStatus, CreateMembership, Membership, MembershipRole, OrganizationMembership,
    RoleChange, UpdateMembership,
};
use leadpilot_core::repository::MembershipRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::invitation;
use super::organization::fetch_organizations;
use crate::error::{DbError, membership_transaction_failed, parse_uuid, query_failed};

/// Closes a roster transaction. Bumping the organization's revision makes
/// concurrent roster transactions on the same organization conflict; the
/// owner count is read after this transaction's own writes.
const CLOSE_ROSTER_TRANSACTION: &str = "\
UPDATE type::record('organization', $organization_id) \
    SET membership_revision += 1; \
LET $owners = (SELECT VALUE id FROM user_organization \
    WHERE organization_id = $organization_id AND role = 'owner' \
    AND is_active = true); \
IF array::len($owners) = 0 { THROW 'last_owner'; }; \
COMMIT TRANSACTION;";

#[derive(Debug, SurrealValue)]
pub(crate) struct MembershipRowWithId {
    pub(crate) record_id: String,
    pub(crate) user_id: String,
    pub(crate) organization_id: String,
    role: String,
    is_active: bool,
    approval_status: String,
    joined_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub(crate) fn parse_role(s: &str) -> Result<MembershipRole, DbError> {
    MembershipRole::parse(s).ok_or_else(|| DbError::Decode(format!("unknown role: {s}")))
}

fn parse_approval(s: &str) -> Result<ApprovalStatus, DbError> {
    ApprovalStatus::parse(s)
        .ok_or_else(|| DbError::Decode(format!("unknown approval status: {s}")))
}

impl MembershipRowWithId {
    pub(crate) fn try_into_membership(self) -> Result<Membership, DbError> {
        Ok(Membership {
            id: parse_uuid(&self.record_id, "membership")?,
            user_id: parse_uuid(&self.user_id, "user")?,
            organization_id: parse_uuid(&self.organization_id, "organization")?,
            role: parse_role(&self.role)?,
            is_active: self.is_active,
            approval_status: parse_approval(&self.approval_status)?,
            joined_at: self.joined_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Membership repository.
#[derive(Clone)]
pub struct SurrealMembershipRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealMembershipRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Membership>, DbError> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user_organization \
                 WHERE user_id = $user_id AND organization_id = $organization_id",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("organization_id", organization_id.to_string()))
            .await?;

        let rows: Vec<MembershipRowWithId> = result.take(0)?;
        rows.into_iter()
            .next()
            .map(MembershipRowWithId::try_into_membership)
            .transpose()
    }
}

impl<C: Connection> MembershipRepository for SurrealMembershipRepository<C> {
    async fn create(&self, input: CreateMembership) -> LeadpilotResult<Membership> {
        if self.find(input.user_id, input.organization_id).await?.is_some() {
            return Err(DbError::Conflict {
                entity: "user_organization".into(),
            }
            .into());
        }

        let id = Uuid::new_v4();

        let result = self
            .db
            .query(
                "CREATE type::record('user_organization', $id) SET \
                 user_id = $user_id, organization_id = $organization_id, \
                 role = $role, is_active = true, \
                 approval_status = $approval_status",
            )
            .bind(("id", id.to_string()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("organization_id", input.organization_id.to_string()))
            .bind(("role", input.role.as_str().to_string()))
            .bind(("approval_status", input.approval_status.as_str().to_string()))
            .await
            .map_err(DbError::from)?;
        result
            .check()
            .map_err(|e| query_failed("user_organization", e))?;

        self.get(input.user_id, input.organization_id).await
    }

    async fn get(&self, user_id: Uuid, organization_id: Uuid) -> LeadpilotResult<Membership> {
        self.find(user_id, organization_id).await?.ok_or_else(|| {
            DbError::NotFound {
                entity: "user_organization".into(),
                id: format!("user={user_id},organization={organization_id}"),
            }
            .into()
        })
    }

    async fn list_accessible(&self, user_id: Uuid) -> LeadpilotResult<Vec<OrganizationMembership>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user_organization \
                 WHERE user_id = $user_id AND is_active = true \
                 AND approval_status = 'approved' \
                 ORDER BY joined_at DESC",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MembershipRowWithId> = result.take(0).map_err(DbError::from)?;
        let memberships = rows
            .into_iter()
            .map(MembershipRowWithId::try_into_membership)
            .collect::<Result<Vec<_>, DbError>>()?;

        let org_ids = memberships
            .iter()
            .map(|m| m.organization_id.to_string())
            .collect();
        let mut organizations: HashMap<Uuid, _> = fetch_organizations(&self.db, org_ids)
            .await?
            .into_iter()
            .map(|org| (org.id, org))
            .collect();

        // Keep the joined_at ordering; drop memberships whose organization
        // is missing or deactivated.
        Ok(memberships
            .into_iter()
            .filter_map(|membership| {
                let organization = organizations.remove(&membership.organization_id)?;
                organization.is_active.then_some(OrganizationMembership {
                    organization,
                    membership,
                })
            })
            .collect())
    }

    async fn list_for_organization(&self, organization_id: Uuid) -> LeadpilotResult<Vec<Membership>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user_organization \
                 WHERE organization_id = $organization_id \
                 ORDER BY joined_at ASC",
            )
            .bind(("organization_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MembershipRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(MembershipRowWithId::try_into_membership)
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }

    async fn update(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        input: UpdateMembership,
    ) -> LeadpilotResult<Membership> {
        let mut sets = Vec::new();
        if input.role.is_some() {
            sets.push("role = $role");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        if input.approval_status.is_some() {
            sets.push("approval_status = $approval_status");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE user_organization SET {} \
             WHERE user_id = $user_id AND organization_id = $organization_id",
            sets.join(", ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("user_id", user_id.to_string()))
            .bind(("organization_id", organization_id.to_string()));

        if let Some(role) = input.role {
            builder = builder.bind(("role", role.as_str().to_string()));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }
        if let Some(approval_status) = input.approval_status {
            builder = builder.bind(("approval_status", approval_status.as_str().to_string()));
        }

        let result = builder.await.map_err(DbError::from)?;
        result
            .check()
            .map_err(|e| query_failed("user_organization", e))?;

        self.get(user_id, organization_id).await
    }

    async fn apply_role_changes(
        &self,
        organization_id: Uuid,
        changes: Vec<RoleChange>,
    ) -> LeadpilotResult<Vec<Membership>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from("BEGIN TRANSACTION; ");
        for i in 0..changes.len() {
            sql.push_str(&format!(
                "UPDATE user_organization SET role = $role_{i}, \
                 updated_at = time::now() \
                 WHERE user_id = $user_{i} \
                 AND organization_id = $organization_id; "
            ));
        }
        sql.push_str(CLOSE_ROSTER_TRANSACTION);

        let mut builder = self
            .db
            .query(&sql)
            .bind(("organization_id", organization_id.to_string()));
        for (i, change) in changes.iter().enumerate() {
            builder = builder
                .bind((format!("role_{i}"), change.role.as_str().to_string()))
                .bind((format!("user_{i}"), change.user_id.to_string()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let errors = result.take_errors();
        if !errors.is_empty() {
            return Err(membership_transaction_failed(organization_id, errors));
        }

        let mut updated = Vec::with_capacity(changes.len());
        for change in &changes {
            updated.push(self.get(change.user_id, organization_id).await?);
        }
        Ok(updated)
    }

    async fn deactivate(&self, user_id: Uuid, organization_id: Uuid) -> LeadpilotResult<Membership> {
        let sql = format!(
            "BEGIN TRANSACTION; \
             UPDATE user_organization SET is_active = false, blocked = false, \
             updated_at = time::now() \
             WHERE user_id = $user_id AND organization_id = $organization_id; \
             {CLOSE_ROSTER_TRANSACTION}"
        );

        let mut result = self
            .db
            .query(&sql)
            .bind(("user_id", user_id.to_string()))
            .bind(("organization_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let errors = result.take_errors();
        if !errors.is_empty() {
            return Err(membership_transaction_failed(organization_id, errors));
        }

        self.get(user_id, organization_id).await
    }

    async fn record_invitation(&self, input: CreateInvitation) -> LeadpilotResult<Invitation> {
        invitation::create(&self.db, input).await.map_err(Into::into)
    }
}
