//! Membership resolver with a last-good cache.
//!
//! A failed reload for a principal whose memberships were loaded before
//! returns the cached list flagged as stale instead of an empty set. Only
//! a principal with no cached list sees `OrganizationsUnavailable`.

use std::collections::HashMap;

use leadpilot_core::error::{LeadpilotError, LeadpilotResult};
use leadpilot_core::models::membership::OrganizationMembership;
use leadpilot_core::repository::MembershipRepository;
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct MembershipSnapshot {
    /// Approved, active memberships in active organizations, most recently
    /// joined first.
    pub memberships: Vec<OrganizationMembership>,
    /// The list comes from the cache because the last reload failed.
    pub stale: bool,
}

pub struct MembershipResolver<M: MembershipRepository> {
    repo: M,
    last_good: Mutex<HashMap<Uuid, Vec<OrganizationMembership>>>,
}

impl<M: MembershipRepository> MembershipResolver<M> {
    pub fn new(repo: M) -> Self {
        Self {
            repo,
            last_good: Mutex::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &M {
        &self.repo
    }

    pub async fn load(&self, principal_id: Uuid) -> LeadpilotResult<MembershipSnapshot> {
        match self.repo.list_accessible(principal_id).await {
            Ok(list) => {
                let mut memberships: Vec<_> = list
                    .into_iter()
                    .filter(|m| m.membership.grants_access() && m.organization.is_active)
                    .collect();
                memberships.sort_by(|a, b| b.membership.joined_at.cmp(&a.membership.joined_at));

                debug!(%principal_id, count = memberships.len(), "Memberships loaded");
                self.last_good.lock().insert(principal_id, memberships.clone());
                Ok(MembershipSnapshot {
                    memberships,
                    stale: false,
                })
            }
            Err(e) => {
                let cached = self.last_good.lock().get(&principal_id).cloned();
                match cached {
                    Some(memberships) => {
                        warn!(
                            %principal_id,
                            error = %e,
                            "Membership reload failed; serving last known list"
                        );
                        Ok(MembershipSnapshot {
                            memberships,
                            stale: true,
                        })
                    }
                    None => Err(LeadpilotError::OrganizationsUnavailable {
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }

    /// Drop the cached list, e.g. on sign-out.
    pub fn forget(&self, principal_id: Uuid) {
        self.last_good.lock().remove(&principal_id);
    }
}
