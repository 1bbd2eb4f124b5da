//! Organization context: the single "current organization" of a session.
//!
//! State machine:
//!
//! ```text
//! Uninitialized --activate--> Loading --memberships--> Selected(org) | Empty
//!       ^                                                   |
//!       +---------------------- sign_out -------------------+
//! ```
//!
//! Snapshots are published on a `tokio::sync::watch` channel. Whenever the
//! selected organization changes, `generation` is incremented; views that
//! depend on the current organization must re-derive their state when they
//! observe a new generation.
//!
//! Every asynchronous operation records the session epoch it started in.
//! If the principal signs out (or the context is re-activated) before the
//! backend answers, the result is not applied.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use leadpilot_core::error::{LeadpilotError, LeadpilotResult};
use leadpilot_core::models::invitation::{CreateInvitation, DeliveryStatus, Invitation};
use leadpilot_core::models::membership::{
    Membership, MembershipRole, OrganizationMembership, RoleChange,
};
use leadpilot_core::models::organization::{
    CreateOrganization, Organization, SubscriptionPlan, UpdateOrganization,
};
use leadpilot_core::repository::{MembershipRepository, OrganizationRepository};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::confirm::{ActionFailed, Confirmed};
use crate::guard::InFlightGuard;
use crate::resolver::{MembershipResolver, MembershipSnapshot};
use crate::selection::SelectionStore;
use crate::slug;

const REFRESH: &str = "refresh";
const CREATE_ORGANIZATION: &str = "create_organization";
const UPDATE_ORGANIZATION: &str = "update_organization";
const INVITE_USER: &str = "invite_user";
/// Shared by every change to an organization's roster, so a removal and a
/// role change on the same organization never overlap in one process.
const MEMBERSHIP_MUTATION: &str = "membership_mutation";

#[derive(Debug, Clone, Default)]
pub enum ContextState {
    /// No principal.
    #[default]
    Uninitialized,
    /// Memberships are being fetched.
    Loading,
    Selected(OrganizationMembership),
    /// The principal has no approved, active membership.
    Empty,
}

impl ContextState {
    pub fn selected(&self) -> Option<&OrganizationMembership> {
        match self {
            Self::Selected(m) => Some(m),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    pub principal_id: Option<Uuid>,
    pub state: ContextState,
    /// Every membership the principal may select from.
    pub memberships: Vec<OrganizationMembership>,
    /// Bumped whenever the selected organization changes.
    pub generation: u64,
    /// The membership list was served from cache after a failed reload.
    pub stale: bool,
}

impl ContextSnapshot {
    pub fn current(&self) -> Option<&OrganizationMembership> {
        self.state.selected()
    }

    pub fn current_organization_id(&self) -> Option<Uuid> {
        self.current().map(OrganizationMembership::organization_id)
    }

    pub fn role(&self) -> Option<MembershipRole> {
        self.current().map(OrganizationMembership::role)
    }
}

/// Input for [`OrganizationContext::create_organization`].
#[derive(Debug, Clone, Default)]
pub struct NewOrganization {
    pub name: String,
    /// Overrides the slug derived from `name`.
    pub slug: Option<String>,
    pub domain: Option<String>,
    pub settings: Option<serde_json::Value>,
}

/// Changes to the current organization. The subscription plan is not
/// editable here; it only changes through the admin console.
#[derive(Debug, Clone, Default)]
pub struct OrganizationChanges {
    /// A new name also regenerates the slug unless `slug` is given.
    pub name: Option<String>,
    pub slug: Option<String>,
    /// `Some(None)` clears the domain.
    pub domain: Option<Option<String>>,
    pub settings: Option<serde_json::Value>,
}

/// Soft-removal of a member from the current organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveMember {
    pub user_id: Uuid,
}

/// Result of an invitation. `delivery` stays `PendingIntegration` until a
/// notification channel actually sends something.
#[derive(Debug, Clone)]
pub struct InviteOutcome {
    pub invitation: Invitation,
    pub delivery: DeliveryStatus,
}

pub struct OrganizationContext<O: OrganizationRepository, M: MembershipRepository> {
    organizations: O,
    resolver: MembershipResolver<M>,
    selection: Arc<dyn SelectionStore>,
    guard: InFlightGuard,
    state: watch::Sender<ContextSnapshot>,
    epoch: AtomicU64,
}

impl<O: OrganizationRepository, M: MembershipRepository> OrganizationContext<O, M> {
    pub fn new(organizations: O, memberships: M, selection: Arc<dyn SelectionStore>) -> Self {
        Self {
            organizations,
            resolver: MembershipResolver::new(memberships),
            selection,
            guard: InFlightGuard::new(),
            state: watch::Sender::new(ContextSnapshot::default()),
            epoch: AtomicU64::new(0),
        }
    }

    // -------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------

    pub fn subscribe(&self) -> watch::Receiver<ContextSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        self.state.borrow().clone()
    }

    pub fn current(&self) -> Option<OrganizationMembership> {
        self.state.borrow().current().cloned()
    }

    // -------------------------------------------------------------------
    // Session lifecycle
    // -------------------------------------------------------------------

    /// Start a session for `principal_id` and resolve its current
    /// organization. On failure the context stays `Loading` until a later
    /// [`refresh`](Self::refresh) succeeds.
    pub async fn activate(&self, principal_id: Uuid) -> LeadpilotResult<ContextSnapshot> {
        let mut epoch = 0;
        self.state.send_modify(|snapshot| {
            epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            let generation = snapshot.generation + u64::from(snapshot.current().is_some());
            *snapshot = ContextSnapshot {
                principal_id: Some(principal_id),
                state: ContextState::Loading,
                memberships: Vec::new(),
                generation,
                stale: false,
            };
        });
        info!(%principal_id, "Organization context loading");

        let loaded = self.resolver.load(principal_id).await?;
        self.apply_memberships(epoch, principal_id, loaded, None);
        Ok(self.snapshot())
    }

    pub fn sign_out(&self) {
        let mut signed_out = None;
        self.state.send_modify(|snapshot| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            signed_out = snapshot.principal_id;
            let generation = snapshot.generation + u64::from(snapshot.current().is_some());
            *snapshot = ContextSnapshot {
                generation,
                ..ContextSnapshot::default()
            };
        });
        if let Some(principal_id) = signed_out {
            self.resolver.forget(principal_id);
            info!(%principal_id, "Organization context cleared");
        }
    }

    /// Reload memberships, keeping the current selection when it is still
    /// valid and falling back otherwise.
    pub async fn refresh(&self) -> LeadpilotResult<ContextSnapshot> {
        let principal_id = self.principal()?;
        let epoch = self.epoch.load(Ordering::SeqCst);
        let _ticket = self.guard.try_acquire(REFRESH, principal_id)?;

        let preferred = self.state.borrow().current_organization_id();
        let loaded = self.resolver.load(principal_id).await?;
        self.apply_memberships(epoch, principal_id, loaded, preferred);
        Ok(self.snapshot())
    }

    // -------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------

    /// Make `organization_id` current. It must be one of the principal's
    /// approved, active memberships; otherwise nothing changes.
    pub fn switch_organization(&self, organization_id: Uuid) -> LeadpilotResult<ContextSnapshot> {
        let principal_id = self.principal()?;
        let target = self
            .state
            .borrow()
            .memberships
            .iter()
            .find(|m| m.organization_id() == organization_id)
            .cloned()
            .ok_or(LeadpilotError::NotAMember { organization_id })?;

        self.selection.save(principal_id, organization_id)?;
        self.state.send_modify(|snapshot| {
            snapshot.state = ContextState::Selected(target);
            snapshot.generation += 1;
        });
        info!(%principal_id, %organization_id, "Switched organization");
        Ok(self.snapshot())
    }

    // -------------------------------------------------------------------
    // Organization lifecycle
    // -------------------------------------------------------------------

    /// Create an organization owned by the current principal and make it
    /// the current organization.
    pub async fn create_organization(
        &self,
        input: NewOrganization,
    ) -> LeadpilotResult<OrganizationMembership> {
        let principal_id = self.principal()?;
        let name = slug::validate_name(&input.name)?.to_string();
        let slug = slug::resolve_slug(&name, input.slug.as_deref())?;
        let domain = input
            .domain
            .as_deref()
            .map(slug::validate_domain)
            .transpose()?;

        let epoch = self.epoch.load(Ordering::SeqCst);
        let _ticket = self.guard.try_acquire(CREATE_ORGANIZATION, principal_id)?;

        let created = self
            .organizations
            .create_with_owner(
                CreateOrganization {
                    name,
                    slug,
                    domain,
                    settings: input.settings,
                    subscription_plan: SubscriptionPlan::default(),
                },
                principal_id,
            )
            .await?;
        info!(
            %principal_id,
            organization_id = %created.organization_id(),
            slug = %created.organization.slug,
            "Organization created"
        );

        let mut loaded = match self.resolver.load(principal_id).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(%principal_id, error = %e, "Membership reload after create failed");
                let memberships = self.state.borrow().memberships.clone();
                MembershipSnapshot {
                    memberships,
                    stale: true,
                }
            }
        };
        if !loaded
            .memberships
            .iter()
            .any(|m| m.organization_id() == created.organization_id())
        {
            loaded.memberships.insert(0, created.clone());
        }

        self.apply_memberships(
            epoch,
            principal_id,
            loaded,
            Some(created.organization_id()),
        );
        Ok(created)
    }

    /// Update the current organization. Requires admin or owner.
    pub async fn update_organization(
        &self,
        changes: OrganizationChanges,
    ) -> LeadpilotResult<Organization> {
        let current = self.current_membership()?;
        let caller = self.fresh_caller(&current).await?;
        require_manager(&caller, "update the organization")?;

        let name = changes
            .name
            .as_deref()
            .map(slug::validate_name)
            .transpose()?
            .map(str::to_string);
        let slug = match (changes.slug.as_deref(), name.as_deref()) {
            (Some(explicit), _) => Some(slug::resolve_slug("", Some(explicit))?),
            (None, Some(name)) => Some(slug::resolve_slug(name, None)?),
            (None, None) => None,
        };
        let domain = match changes.domain {
            Some(Some(domain)) => Some(Some(slug::validate_domain(&domain)?)),
            Some(None) => Some(None),
            None => None,
        };

        let organization_id = current.organization_id();
        let epoch = self.epoch.load(Ordering::SeqCst);
        let _ticket = self.guard.try_acquire(UPDATE_ORGANIZATION, organization_id)?;

        let updated = self
            .organizations
            .update(
                organization_id,
                UpdateOrganization {
                    name,
                    slug,
                    domain,
                    settings: changes.settings,
                },
            )
            .await?;
        info!(%organization_id, slug = %updated.slug, "Organization updated");

        let replacement = updated.clone();
        self.publish_if_current(epoch, move |snapshot| {
            for m in &mut snapshot.memberships {
                if m.organization_id() == replacement.id {
                    m.organization = replacement.clone();
                }
            }
            if let ContextState::Selected(m) = &mut snapshot.state {
                if m.organization_id() == replacement.id {
                    m.organization = replacement;
                }
            }
        });
        Ok(updated)
    }

    // -------------------------------------------------------------------
    // Membership management
    // -------------------------------------------------------------------

    /// Record an invitation into the current organization. Nobody can be
    /// invited as owner.
    pub async fn invite_user(&self, email: &str, role: MembershipRole) -> LeadpilotResult<InviteOutcome> {
        if role == MembershipRole::Owner {
            return Err(LeadpilotError::denied("members cannot be invited as owner"));
        }
        let email = normalize_email(email)?;
        let current = self.current_membership()?;
        let caller = self.fresh_caller(&current).await?;
        require_manager(&caller, "invite members")?;

        let organization_id = current.organization_id();
        let _ticket = self.guard.try_acquire(INVITE_USER, organization_id)?;

        let invitation = self
            .resolver
            .repository()
            .record_invitation(CreateInvitation {
                organization_id,
                email,
                role,
                invited_by: current.membership.user_id,
            })
            .await?;
        info!(
            %organization_id,
            invitation_id = %invitation.id,
            role = role.as_str(),
            delivery = invitation.delivery.as_str(),
            "Invitation recorded; no notification was sent"
        );

        Ok(InviteOutcome {
            delivery: invitation.delivery,
            invitation,
        })
    }

    /// Soft-remove a member (`is_active = false`). The last active owner
    /// can never be removed, and only an owner may remove an owner.
    pub async fn remove_user(
        &self,
        request: Confirmed<RemoveMember>,
    ) -> Result<Membership, ActionFailed<RemoveMember>> {
        match self.try_remove_user(*request.action()).await {
            Ok(membership) => Ok(membership),
            Err(error) => Err(request.fail(error)),
        }
    }

    async fn try_remove_user(&self, request: RemoveMember) -> LeadpilotResult<Membership> {
        let current = self.current_membership()?;
        let organization_id = current.organization_id();
        let _ticket = self.guard.try_acquire(MEMBERSHIP_MUTATION, organization_id)?;
        let repo = self.resolver.repository();

        let members = repo.list_for_organization(organization_id).await?;
        let caller = find_caller(&members, &current)?;
        require_manager(caller, "remove members")?;

        let target = find_member(&members, request.user_id, organization_id)?;
        if !target.is_active {
            return Err(LeadpilotError::InvalidTransition {
                reason: format!("user {} is already removed", request.user_id),
            });
        }
        if target.role == MembershipRole::Owner {
            require_owner(caller, "remove an owner")?;
            let remaining = members
                .iter()
                .filter(|m| m.is_active_owner() && m.user_id != request.user_id)
                .count();
            if remaining == 0 {
                return Err(LeadpilotError::LastOwner { organization_id });
            }
        }

        let removed = repo.deactivate(request.user_id, organization_id).await?;
        info!(%organization_id, user_id = %request.user_id, "Member removed");

        self.reload_after_mutation().await;
        Ok(removed)
    }

    pub async fn update_user_role(&self, user_id: Uuid, role: MembershipRole) -> LeadpilotResult<Membership> {
        let mut updated = self.update_user_roles(vec![RoleChange { user_id, role }]).await?;
        updated.pop().ok_or_else(|| {
            LeadpilotError::Internal("role change returned no membership".into())
        })
    }

    /// Apply several role changes as one unit. This is how the last owner
    /// hands over ownership: promote the successor and demote the owner in
    /// the same call.
    pub async fn update_user_roles(&self, changes: Vec<RoleChange>) -> LeadpilotResult<Vec<Membership>> {
        if changes.is_empty() {
            return Err(LeadpilotError::validation("no role changes given"));
        }
        for (i, change) in changes.iter().enumerate() {
            if changes[..i].iter().any(|c| c.user_id == change.user_id) {
                return Err(LeadpilotError::validation(format!(
                    "user {} appears more than once",
                    change.user_id
                )));
            }
        }

        let current = self.current_membership()?;
        let organization_id = current.organization_id();
        let _ticket = self.guard.try_acquire(MEMBERSHIP_MUTATION, organization_id)?;
        let repo = self.resolver.repository();

        let members = repo.list_for_organization(organization_id).await?;
        let caller = find_caller(&members, &current)?;
        require_manager(caller, "change member roles")?;

        for change in &changes {
            let target = find_member(&members, change.user_id, organization_id)?;
            if !target.is_active {
                return Err(LeadpilotError::InvalidTransition {
                    reason: format!("user {} is not an active member", change.user_id),
                });
            }
            if change.role == MembershipRole::Owner || target.role == MembershipRole::Owner {
                require_owner(caller, "grant or revoke ownership")?;
            }
        }
        if active_owners_after(&members, &changes) == 0 {
            return Err(LeadpilotError::LastOwner { organization_id });
        }

        let updated = repo.apply_role_changes(organization_id, changes).await?;
        info!(%organization_id, count = updated.len(), "Member roles updated");

        self.reload_after_mutation().await;
        Ok(updated)
    }

    /// Every membership of the current organization, in any state.
    pub async fn list_members(&self) -> LeadpilotResult<Vec<Membership>> {
        let current = self.current_membership()?;
        self.resolver
            .repository()
            .list_for_organization(current.organization_id())
            .await
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    fn principal(&self) -> LeadpilotResult<Uuid> {
        self.state
            .borrow()
            .principal_id
            .ok_or_else(|| LeadpilotError::AuthenticationFailed {
                reason: "no signed-in principal".into(),
            })
    }

    fn current_membership(&self) -> LeadpilotResult<OrganizationMembership> {
        self.principal()?;
        self.current().ok_or(LeadpilotError::NoCurrentOrganization)
    }

    fn load_selection(&self, principal_id: Uuid) -> Option<Uuid> {
        self.selection.load(principal_id).unwrap_or_else(|e| {
            warn!(%principal_id, error = %e, "Could not read persisted selection");
            None
        })
    }

    /// Pick the current organization out of `loaded` and publish it.
    /// Preference order: `preferred`, the persisted selection, the most
    /// recently joined membership.
    fn apply_memberships(
        &self,
        epoch: u64,
        principal_id: Uuid,
        loaded: MembershipSnapshot,
        preferred: Option<Uuid>,
    ) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(%principal_id, "Discarding memberships from a previous session");
            return;
        }

        let stored = self.load_selection(principal_id);
        let find = |id: Option<Uuid>| {
            id.and_then(|id| loaded.memberships.iter().find(|m| m.organization_id() == id))
        };
        let chosen = find(preferred)
            .or_else(|| find(stored))
            .or_else(|| loaded.memberships.first())
            .cloned();

        let chosen_id = chosen.as_ref().map(OrganizationMembership::organization_id);
        match chosen_id {
            Some(id) if stored != Some(id) => {
                if let Err(e) = self.selection.save(principal_id, id) {
                    warn!(%principal_id, error = %e, "Could not persist selection");
                }
            }
            None if stored.is_some() => {
                if let Err(e) = self.selection.clear(principal_id) {
                    warn!(%principal_id, error = %e, "Could not clear selection");
                }
            }
            _ => {}
        }

        let applied = self.publish_if_current(epoch, |snapshot| {
            if snapshot.current_organization_id() != chosen_id {
                snapshot.generation += 1;
            }
            snapshot.state = match chosen {
                Some(m) => ContextState::Selected(m),
                None => ContextState::Empty,
            };
            snapshot.memberships = loaded.memberships;
            snapshot.stale = loaded.stale;
        });
        if applied {
            match chosen_id {
                Some(organization_id) => {
                    info!(%principal_id, %organization_id, "Organization selected")
                }
                None => info!(%principal_id, "Principal has no usable organization"),
            }
        }
    }

    /// Apply `update` unless the session changed since `epoch`.
    fn publish_if_current(&self, epoch: u64, update: impl FnOnce(&mut ContextSnapshot)) -> bool {
        self.state.send_if_modified(|snapshot| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            update(snapshot);
            true
        })
    }

    /// The caller's membership as stored now. The snapshot role may be
    /// stale when another session changed it.
    async fn fresh_caller(&self, current: &OrganizationMembership) -> LeadpilotResult<Membership> {
        match self
            .resolver
            .repository()
            .get(current.membership.user_id, current.organization_id())
            .await
        {
            Ok(membership) => Ok(membership),
            Err(LeadpilotError::NotFound { .. }) => Err(LeadpilotError::denied(
                "caller is no longer a member of the organization",
            )),
            Err(e) => Err(e),
        }
    }

    async fn reload_after_mutation(&self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Membership reload after mutation failed");
        }
    }
}

/// Admins and owners manage the organization and its members. Only a
/// membership that currently grants access counts.
fn require_manager(caller: &Membership, action: &str) -> LeadpilotResult<()> {
    if caller.grants_access() && caller.role.can_manage_members() {
        Ok(())
    } else {
        Err(denied_for(caller, action))
    }
}

fn require_owner(caller: &Membership, action: &str) -> LeadpilotResult<()> {
    if caller.grants_access() && caller.role == MembershipRole::Owner {
        Ok(())
    } else {
        Err(denied_for(caller, action))
    }
}

fn denied_for(caller: &Membership, action: &str) -> LeadpilotError {
    if caller.grants_access() {
        LeadpilotError::denied(format!("{} role cannot {action}", caller.role.as_str()))
    } else {
        LeadpilotError::denied(format!("inactive membership cannot {action}"))
    }
}

/// The caller's row in a freshly read member list.
fn find_caller<'a>(members: &'a [Membership], current: &OrganizationMembership) -> LeadpilotResult<&'a Membership> {
    let user_id = current.membership.user_id;
    members
        .iter()
        .find(|m| m.user_id == user_id)
        .ok_or_else(|| LeadpilotError::denied("caller is no longer a member of the organization"))
}

fn find_member(members: &[Membership], user_id: Uuid, organization_id: Uuid) -> LeadpilotResult<&Membership> {
    members
        .iter()
        .find(|m| m.user_id == user_id)
        .ok_or_else(|| LeadpilotError::NotFound {
            entity: "user_organization".into(),
            id: format!("user={user_id},organization={organization_id}"),
        })
}

/// Number of active owners once `changes` are applied.
fn active_owners_after(members: &[Membership], changes: &[RoleChange]) -> usize {
    members
        .iter()
        .filter(|m| m.is_active)
        .filter(|m| {
            let role = changes
                .iter()
                .find(|c| c.user_id == m.user_id)
                .map_or(m.role, |c| c.role);
            role == MembershipRole::Owner
        })
        .count()
}

fn normalize_email(email: &str) -> LeadpilotResult<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(LeadpilotError::validation(format!("invalid email address '{email}'")))
    }
}
