//! Cross-tenant user listing used by the platform admin console.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::membership::{ApprovalStatus, MembershipRole};
use super::organization::SubscriptionPlan;

/// One row per membership, across every organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminUserRecord {
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub email_confirmed_at: Option<DateTime<Utc>>,
    pub organization_id: Uuid,
    pub organization_name: String,
    pub subscription_plan: SubscriptionPlan,
    pub role: MembershipRole,
    pub is_active: bool,
    pub approval_status: ApprovalStatus,
    pub joined_at: DateTime<Utc>,
}
