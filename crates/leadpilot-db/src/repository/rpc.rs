//! RPC-style capabilities backed by SurrealQL `fn::` functions.
//!
//! The functions are deployed by migration v2. When they are missing every
//! call reports `CapabilityUnavailable` so callers can decide whether to
//! tolerate the gap.

use std::collections::HashMap;

use leadpilot_core::error::{LeadpilotError, LeadpilotResult};
use leadpilot_core::models::admin::AdminUserRecord;
use leadpilot_core::models::membership::{ApprovalStatus, ApprovalStatusMessage};
use leadpilot_core::models::organization::{Organization, SubscriptionPlan};
use leadpilot_core::repository::{AdminGateway, ApprovalGateway};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::membership::MembershipRowWithId;
use super::organization::fetch_organizations;
use super::principal::PrincipalRowWithId;
use crate::error::{DbError, parse_uuid, rpc_failed};

const IS_APPROVED: &str = "is_user_approved_and_active";
const STATUS_MESSAGE: &str = "get_user_approval_status_message";
const ADMIN_USERS: &str = "get_admin_users";
const APPROVE: &str = "approve_user";
const REJECT: &str = "reject_user";
const SET_ACTIVE: &str = "set_user_active";
const UPDATE_PLAN: &str = "update_organization_subscription_plan";

#[derive(Debug, SurrealValue)]
struct StatusMessageRow {
    status: String,
    message: Option<String>,
}

impl StatusMessageRow {
    /// Unknown statuses are read as pending; they must never grant access.
    fn normalize(self) -> ApprovalStatusMessage {
        let status = ApprovalStatus::parse(self.status.trim().to_lowercase().as_str())
            .unwrap_or(ApprovalStatus::Pending);
        let message = self.message.filter(|m| !m.trim().is_empty());
        ApprovalStatusMessage { status, message }
    }
}

/// SurrealDB implementation of the approval and admin gateways.
#[derive(Clone)]
pub struct SurrealRpcGateway<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRpcGateway<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn call_count(
        &self,
        capability: &str,
        sql: &str,
        binds: Vec<(&'static str, serde_json::Value)>,
    ) -> LeadpilotResult<i64> {
        let mut builder = self.db.query(sql);
        for (key, value) in binds {
            builder = builder.bind((key, value));
        }
        let result = builder.await.map_err(|e| rpc_failed(capability, e))?;
        let mut result = result.check().map_err(|e| rpc_failed(capability, e))?;
        let count: Option<i64> = result.take(0).map_err(|e| rpc_failed(capability, e))?;
        Ok(count.unwrap_or(0))
    }

    async fn fetch_principals(
        &self,
        ids: Vec<String>,
    ) -> Result<HashMap<Uuid, PrincipalRowWithId>, DbError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM principal \
                 WHERE meta::id(id) IN $ids",
            )
            .bind(("ids", ids))
            .await?;
        let rows: Vec<PrincipalRowWithId> = result.take(0)?;
        rows.into_iter()
            .map(|row| Ok((parse_uuid(&row.record_id, "principal")?, row)))
            .collect()
    }
}

impl<C: Connection> ApprovalGateway for SurrealRpcGateway<C> {
    async fn is_user_approved_and_active(&self, user_id: Uuid) -> LeadpilotResult<bool> {
        let result = self
            .db
            .query("RETURN fn::is_user_approved_and_active($user_id)")
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(|e| rpc_failed(IS_APPROVED, e))?;
        let mut result = result.check().map_err(|e| rpc_failed(IS_APPROVED, e))?;
        let approved: Option<bool> = result.take(0).map_err(|e| rpc_failed(IS_APPROVED, e))?;
        Ok(approved.unwrap_or(false))
    }

    async fn approval_status_message(&self, user_id: Uuid) -> LeadpilotResult<ApprovalStatusMessage> {
        let result = self
            .db
            .query("RETURN fn::get_user_approval_status_message($user_id)")
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(|e| rpc_failed(STATUS_MESSAGE, e))?;
        let mut result = result.check().map_err(|e| rpc_failed(STATUS_MESSAGE, e))?;
        let row: Option<StatusMessageRow> =
            result.take(0).map_err(|e| rpc_failed(STATUS_MESSAGE, e))?;

        row.map(StatusMessageRow::normalize).ok_or_else(|| {
            LeadpilotError::Database(format!("{STATUS_MESSAGE} returned no value"))
        })
    }
}

impl<C: Connection> AdminGateway for SurrealRpcGateway<C> {
    async fn list_admin_users(&self) -> LeadpilotResult<Vec<AdminUserRecord>> {
        let result = self
            .db
            .query("RETURN fn::get_admin_users()")
            .await
            .map_err(|e| rpc_failed(ADMIN_USERS, e))?;
        let mut result = result.check().map_err(|e| rpc_failed(ADMIN_USERS, e))?;
        let rows: Vec<MembershipRowWithId> =
            result.take(0).map_err(|e| rpc_failed(ADMIN_USERS, e))?;

        let memberships = rows
            .into_iter()
            .map(MembershipRowWithId::try_into_membership)
            .collect::<Result<Vec<_>, DbError>>()?;

        let mut user_ids: Vec<String> = memberships.iter().map(|m| m.user_id.to_string()).collect();
        user_ids.sort();
        user_ids.dedup();
        let mut org_ids: Vec<String> = memberships
            .iter()
            .map(|m| m.organization_id.to_string())
            .collect();
        org_ids.sort();
        org_ids.dedup();

        let principals = self.fetch_principals(user_ids).await?;
        let organizations: HashMap<Uuid, Organization> = fetch_organizations(&self.db, org_ids)
            .await?
            .into_iter()
            .map(|org| (org.id, org))
            .collect();

        Ok(memberships
            .into_iter()
            .filter_map(|m| {
                let principal = principals.get(&m.user_id)?;
                let organization = organizations.get(&m.organization_id)?;
                Some(AdminUserRecord {
                    membership_id: m.id,
                    user_id: m.user_id,
                    email: principal.email.clone(),
                    display_name: principal.display_name.clone(),
                    email_confirmed_at: principal.email_confirmed_at,
                    organization_id: organization.id,
                    organization_name: organization.name.clone(),
                    subscription_plan: organization.subscription_plan,
                    role: m.role,
                    is_active: m.is_active,
                    approval_status: m.approval_status,
                    joined_at: m.joined_at,
                })
            })
            .collect())
    }

    async fn approve_user(&self, user_id: Uuid) -> LeadpilotResult<()> {
        let updated = self
            .call_count(
                APPROVE,
                "RETURN fn::approve_user($user_id)",
                vec![("user_id", user_id.to_string().into())],
            )
            .await?;
        if updated == 0 {
            return Err(LeadpilotError::InvalidTransition {
                reason: format!("user {user_id} has no pending membership to approve"),
            });
        }
        Ok(())
    }

    async fn reject_user(&self, user_id: Uuid) -> LeadpilotResult<()> {
        let updated = self
            .call_count(
                REJECT,
                "RETURN fn::reject_user($user_id)",
                vec![("user_id", user_id.to_string().into())],
            )
            .await?;
        if updated == 0 {
            return Err(LeadpilotError::InvalidTransition {
                reason: format!("user {user_id} has no pending membership to reject"),
            });
        }
        Ok(())
    }

    async fn set_user_active(&self, user_id: Uuid, active: bool) -> LeadpilotResult<()> {
        let updated = self
            .call_count(
                SET_ACTIVE,
                "RETURN fn::set_user_active($user_id, $active)",
                vec![
                    ("user_id", user_id.to_string().into()),
                    ("active", active.into()),
                ],
            )
            .await?;
        if updated == 0 {
            return Err(LeadpilotError::NotFound {
                entity: "user_organization".into(),
                id: format!("user={user_id}"),
            });
        }
        Ok(())
    }

    async fn update_organization_subscription_plan(
        &self,
        organization_id: Uuid,
        plan: SubscriptionPlan,
    ) -> LeadpilotResult<()> {
        let updated = self
            .call_count(
                UPDATE_PLAN,
                "RETURN fn::update_organization_subscription_plan($org_id, $plan)",
                vec![
                    ("org_id", organization_id.to_string().into()),
                    ("plan", plan.as_str().into()),
                ],
            )
            .await?;
        if updated == 0 {
            return Err(LeadpilotError::NotFound {
                entity: "organization".into(),
                id: organization_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_is_read_as_pending() {
        let normalized = StatusMessageRow {
            status: "weird".into(),
            message: Some("  ".into()),
        }
        .normalize();
        assert_eq!(normalized.status, ApprovalStatus::Pending);
        assert_eq!(normalized.message, None);
    }

    #[test]
    fn status_is_case_insensitive() {
        let normalized = StatusMessageRow {
            status: " Rejected ".into(),
            message: Some("Your account request was rejected".into()),
        }
        .normalize();
        assert_eq!(normalized.status, ApprovalStatus::Rejected);
        assert!(normalized.message.is_some());
    }
}
