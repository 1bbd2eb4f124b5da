//! Membership domain model: the (principal, organization) edge.
//!
//! A membership carries a role, an active flag and an approval status.
//! Only a membership that is both active and approved grants access to the
//! organization's data. Removal is soft (`is_active = false`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::organization::Organization;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Owner,
    Admin,
    Member,
}

impl MembershipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Owner => 3,
            Self::Admin => 2,
            Self::Member => 1,
        }
    }

    /// True when this role is at least as privileged as `other`.
    pub fn at_least(&self, other: MembershipRole) -> bool {
        self.rank() >= other.rank()
    }

    /// Admins and owners may edit organization details and manage members.
    pub fn can_manage_members(&self) -> bool {
        self.at_least(MembershipRole::Admin)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: MembershipRole,
    pub is_active: bool,
    pub approval_status: ApprovalStatus,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    /// Whether this membership may be used to reach organization data.
    pub fn grants_access(&self) -> bool {
        self.is_active && self.approval_status == ApprovalStatus::Approved
    }

    pub fn is_active_owner(&self) -> bool {
        self.is_active && self.role == MembershipRole::Owner
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMembership {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: MembershipRole,
    pub approval_status: ApprovalStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateMembership {
    pub role: Option<MembershipRole>,
    pub is_active: Option<bool>,
    pub approval_status: Option<ApprovalStatus>,
}

/// One entry of a role change batch applied atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChange {
    pub user_id: Uuid,
    pub role: MembershipRole,
}

/// A membership joined with the organization it points at, the unit the
/// organization context selects from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationMembership {
    pub organization: Organization,
    pub membership: Membership,
}

impl OrganizationMembership {
    pub fn organization_id(&self) -> Uuid {
        self.organization.id
    }

    pub fn role(&self) -> MembershipRole {
        self.membership.role
    }
}

/// Backend answer to "what is this principal's approval state", already
/// normalized to one shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStatusMessage {
    pub status: ApprovalStatus,
    pub message: Option<String>,
}

/// Where an approval verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalSource {
    Backend,
    /// The approval capability was missing and the check failed open.
    FailOpen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCheck {
    pub status: ApprovalStatus,
    pub message: Option<String>,
    pub source: ApprovalSource,
}

impl ApprovalCheck {
    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }
}
