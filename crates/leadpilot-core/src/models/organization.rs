//! Organization domain model.
//!
//! Organizations are the tenants of Leadpilot. Every piece of customer data
//! is scoped to exactly one organization, and principals reach an
//! organization only through an approved, active membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription tier. `Developer` is the distinguished platform-admin tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    #[default]
    Starter,
    Professional,
    Enterprise,
    Developer,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
            Self::Developer => "developer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "starter" => Some(Self::Starter),
            "professional" => Some(Self::Professional),
            "enterprise" => Some(Self::Enterprise),
            "developer" => Some(Self::Developer),
            _ => None,
        }
    }

    /// Plans a customer subscription can be moved between from the admin
    /// console. `Developer` is deliberately absent.
    pub fn customer_plans() -> [Self; 3] {
        [Self::Starter, Self::Professional, Self::Enterprise]
    }

    pub fn is_customer_plan(&self) -> bool {
        !matches!(self, Self::Developer)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// URL-safe unique identifier derived from the name (e.g., `acme-corp`).
    pub slug: String,
    pub domain: Option<String>,
    /// Free-form settings map.
    pub settings: serde_json::Value,
    pub subscription_plan: SubscriptionPlan,
    /// Organizations are deactivated, never hard-deleted.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a new organization. The slug is already
/// resolved (derived or explicitly supplied) at this point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
    pub slug: String,
    pub domain: Option<String>,
    pub settings: Option<serde_json::Value>,
    pub subscription_plan: SubscriptionPlan,
}

/// Fields a member may change on an organization. The subscription plan is
/// not here: it only moves through the admin console.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    pub slug: Option<String>,
    /// `Some(Some(v))` = set, `Some(None)` = clear, `None` = no change.
    pub domain: Option<Option<String>>,
    pub settings: Option<serde_json::Value>,
}
