//! Invitation model.
//!
//! An invitation records the intent to add an email address to an
//! organization. Delivering it is an external concern, so every invitation
//! carries an explicit delivery status instead of pretending it was sent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::membership::MembershipRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Recorded, but no notification channel is wired up to deliver it.
    PendingIntegration,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingIntegration => "pending_integration",
            Self::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_integration" => Some(Self::PendingIntegration),
            "delivered" => Some(Self::Delivered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role: MembershipRole,
    pub invited_by: Uuid,
    pub delivery: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateInvitation {
    pub organization_id: Uuid,
    pub email: String,
    pub role: MembershipRole,
    pub invited_by: Uuid,
}
