//! Shapes exchanged with the workflow-automation engine.
//!
//! The campaign list is reshaped into `{id, name, status, organization_id}`
//! with a numeric status, and analytics payloads are reduced to rate
//! metrics keyed on the external campaign id.

use leadpilot_core::error::{LeadpilotError, LeadpilotResult};
use leadpilot_core::models::membership::OrganizationMembership;
use leadpilot_core::repository::MembershipRepository;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const STATUS_ACTIVE: u8 = 1;
pub const STATUS_INACTIVE: u8 = 2;

/// A campaign row as stored by the dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct CampaignRecord {
    pub id: String,
    pub name: String,
    pub status: String,
    pub organization_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignSummary {
    pub id: String,
    pub name: String,
    pub status: u8,
    pub organization_id: Uuid,
}

impl CampaignSummary {
    pub fn from_record(record: &CampaignRecord) -> Self {
        let status = match record.status.trim().to_ascii_lowercase().as_str() {
            "active" | "running" => STATUS_ACTIVE,
            _ => STATUS_INACTIVE,
        };
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            status,
            organization_id: record.organization_id,
        }
    }
}

/// The campaign list served to a bearer-authenticated caller.
///
/// The hosting endpoint resolves the token with
/// `SessionStore::principal_for_token` and passes the principal here. The
/// principal's organization is the most recently joined one it may
/// access; only that organization's campaigns are returned. A principal
/// without such a membership gets `NoCurrentOrganization`.
pub async fn campaigns_for_principal<M: MembershipRepository>(
    memberships: &M,
    principal_id: Uuid,
    records: &[CampaignRecord],
) -> LeadpilotResult<Vec<CampaignSummary>> {
    let organization_id = memberships
        .list_accessible(principal_id)
        .await?
        .first()
        .map(OrganizationMembership::organization_id)
        .ok_or(LeadpilotError::NoCurrentOrganization)?;

    let campaigns: Vec<_> = records
        .iter()
        .filter(|r| r.organization_id == organization_id)
        .map(CampaignSummary::from_record)
        .collect();
    debug!(%principal_id, %organization_id, count = campaigns.len(), "Campaign list resolved");
    Ok(campaigns)
}

/// One analytics report for an external campaign. Missing counters read
/// as zero.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsPayload {
    pub campaign_id: String,
    #[serde(default)]
    pub sent: u64,
    #[serde(default)]
    pub opened: u64,
    #[serde(default)]
    pub clicked: u64,
    #[serde(default)]
    pub replied: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignMetrics {
    /// Stable upsert key.
    pub external_id: String,
    pub sent: u64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub reply_rate: f64,
}

impl CampaignMetrics {
    pub fn from_payload(payload: &AnalyticsPayload) -> Self {
        Self {
            external_id: payload.campaign_id.trim().to_string(),
            sent: payload.sent,
            open_rate: rate(payload.opened, payload.sent),
            click_rate: rate(payload.clicked, payload.sent),
            reply_rate: rate(payload.replied, payload.sent),
        }
    }

    /// Reduce a batch to one row per external id. A later payload for the
    /// same campaign replaces an earlier one; first-seen order is kept.
    /// Payloads with a blank campaign id are dropped.
    pub fn from_batch(payloads: &[AnalyticsPayload]) -> Vec<Self> {
        let mut rows: Vec<Self> = Vec::new();
        for metrics in payloads.iter().map(Self::from_payload) {
            if metrics.external_id.is_empty() {
                continue;
            }
            match rows.iter_mut().find(|m| m.external_id == metrics.external_id) {
                Some(existing) => *existing = metrics,
                None => rows.push(metrics),
            }
        }
        rows
    }
}

/// Percentage of `sent`, one decimal place.
fn rate(part: u64, sent: u64) -> f64 {
    if sent == 0 {
        return 0.0;
    }
    (part as f64 / sent as f64 * 1000.0).round() / 10.0
}
