//! Platform admin gate and the cross-tenant admin console.
//!
//! The gate is a pure predicate over the current organization: only the
//! `developer` plan unlocks the console. The console works across every
//! organization, not just the current one.

use leadpilot_core::error::{LeadpilotError, LeadpilotResult};
use leadpilot_core::models::admin::AdminUserRecord;
use leadpilot_core::models::membership::OrganizationMembership;
use leadpilot_core::models::organization::{Organization, SubscriptionPlan};
use leadpilot_core::models::ticket::{SupportTicket, TicketMessage, TicketResponse, TicketStatus};
use leadpilot_core::repository::{AdminGateway, TicketRepository};
use parking_lot::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::confirm::{ActionFailed, Confirmed};
use crate::guard::InFlightGuard;

const BLOCK: &str = "block_user";
const ACTIVATE: &str = "activate_user";
const APPROVE: &str = "approve_user";
const REJECT: &str = "reject_user";
const CHANGE_PLAN: &str = "change_plan";
const RESPOND: &str = "respond_to_ticket";

pub fn is_platform_admin(organization: &Organization) -> bool {
    organization.subscription_plan == SubscriptionPlan::Developer
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockUser {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanChange {
    pub organization_id: Uuid,
    pub plan: SubscriptionPlan,
}

pub struct AdminConsole<G: AdminGateway, T: TicketRepository> {
    gateway: G,
    tickets: T,
    caller_id: Uuid,
    users: RwLock<Vec<AdminUserRecord>>,
    guard: InFlightGuard,
}

impl<G: AdminGateway, T: TicketRepository> AdminConsole<G, T> {
    /// Open the console for the holder of `current`. Fails unless the
    /// current organization is on the developer plan and the membership
    /// grants access.
    pub fn open(current: &OrganizationMembership, gateway: G, tickets: T) -> LeadpilotResult<Self> {
        if !current.membership.grants_access() || !is_platform_admin(&current.organization) {
            return Err(LeadpilotError::denied(
                "the admin console requires a developer-plan organization",
            ));
        }
        info!(caller_id = %current.membership.user_id, "Admin console opened");
        Ok(Self {
            gateway,
            tickets,
            caller_id: current.membership.user_id,
            users: RwLock::new(Vec::new()),
            guard: InFlightGuard::new(),
        })
    }

    pub fn caller_id(&self) -> Uuid {
        self.caller_id
    }

    /// The last successfully loaded user list.
    pub fn users(&self) -> Vec<AdminUserRecord> {
        self.users.read().clone()
    }

    /// Reload every membership across every organization. On failure the
    /// previous list is kept.
    pub async fn refresh(&self) -> LeadpilotResult<Vec<AdminUserRecord>> {
        let users = self.gateway.list_admin_users().await?;
        *self.users.write() = users.clone();
        Ok(users)
    }

    /// Deactivate every active membership of a user. Refuses the caller and
    /// anyone holding a membership in a developer-plan organization.
    /// [`activate`](Self::activate) restores exactly the memberships this
    /// deactivated; members removed from an organization stay removed.
    pub async fn block(
        &self,
        request: Confirmed<BlockUser>,
    ) -> Result<Vec<AdminUserRecord>, ActionFailed<BlockUser>> {
        match self.try_block(request.action().user_id).await {
            Ok(users) => Ok(users),
            Err(error) => Err(request.fail(error)),
        }
    }

    async fn try_block(&self, user_id: Uuid) -> LeadpilotResult<Vec<AdminUserRecord>> {
        if user_id == self.caller_id {
            return Err(LeadpilotError::denied("you cannot block yourself"));
        }
        let _ticket = self.guard.try_acquire(BLOCK, user_id)?;

        let rows = self.gateway.list_admin_users().await?;
        let target: Vec<_> = rows.iter().filter(|r| r.user_id == user_id).collect();
        if target.is_empty() {
            return Err(LeadpilotError::NotFound {
                entity: "user".into(),
                id: user_id.to_string(),
            });
        }
        if target
            .iter()
            .any(|r| r.subscription_plan == SubscriptionPlan::Developer)
        {
            return Err(LeadpilotError::denied(
                "platform admins cannot be blocked from the console",
            ));
        }

        self.gateway.set_user_active(user_id, false).await?;
        info!(caller_id = %self.caller_id, %user_id, "User blocked");
        Ok(self.reload().await)
    }

    pub async fn activate(&self, user_id: Uuid) -> LeadpilotResult<Vec<AdminUserRecord>> {
        let _ticket = self.guard.try_acquire(ACTIVATE, user_id)?;
        self.gateway.set_user_active(user_id, true).await?;
        info!(caller_id = %self.caller_id, %user_id, "User activated");
        Ok(self.reload().await)
    }

    /// Pending memberships become approved and active.
    pub async fn approve(&self, user_id: Uuid) -> LeadpilotResult<Vec<AdminUserRecord>> {
        let _ticket = self.guard.try_acquire(APPROVE, user_id)?;
        self.gateway.approve_user(user_id).await?;
        info!(caller_id = %self.caller_id, %user_id, "User approved");
        Ok(self.reload().await)
    }

    /// Pending memberships become rejected. There is no way back from
    /// here through the console.
    pub async fn reject(&self, user_id: Uuid) -> LeadpilotResult<Vec<AdminUserRecord>> {
        let _ticket = self.guard.try_acquire(REJECT, user_id)?;
        self.gateway.reject_user(user_id).await?;
        info!(caller_id = %self.caller_id, %user_id, "User rejected");
        Ok(self.reload().await)
    }

    /// Move an organization between customer plans with a single backend
    /// call. `developer` can be neither assigned nor taken away here.
    pub async fn change_plan(
        &self,
        request: Confirmed<PlanChange>,
    ) -> Result<Vec<AdminUserRecord>, ActionFailed<PlanChange>> {
        match self.try_change_plan(*request.action()).await {
            Ok(users) => Ok(users),
            Err(error) => Err(request.fail(error)),
        }
    }

    async fn try_change_plan(&self, change: PlanChange) -> LeadpilotResult<Vec<AdminUserRecord>> {
        if !change.plan.is_customer_plan() {
            return Err(LeadpilotError::denied(format!(
                "plan '{}' cannot be assigned from the admin console",
                change.plan.as_str()
            )));
        }
        let _ticket = self.guard.try_acquire(CHANGE_PLAN, change.organization_id)?;

        let rows = self.gateway.list_admin_users().await?;
        if rows.iter().any(|r| {
            r.organization_id == change.organization_id
                && r.subscription_plan == SubscriptionPlan::Developer
        }) {
            return Err(LeadpilotError::denied(
                "developer-plan organizations cannot be moved from the admin console",
            ));
        }

        self.gateway
            .update_organization_subscription_plan(change.organization_id, change.plan)
            .await?;
        info!(
            caller_id = %self.caller_id,
            organization_id = %change.organization_id,
            plan = change.plan.as_str(),
            "Subscription plan changed"
        );
        Ok(self.reload().await)
    }

    pub async fn tickets(&self) -> LeadpilotResult<Vec<SupportTicket>> {
        self.tickets.list_all().await
    }

    pub async fn ticket_messages(&self, ticket_id: Uuid) -> LeadpilotResult<Vec<TicketMessage>> {
        self.tickets.messages(ticket_id).await
    }

    /// Set the ticket status and post a staff reply in one step.
    pub async fn respond_to_ticket(
        &self,
        ticket_id: Uuid,
        status: TicketStatus,
        body: &str,
    ) -> LeadpilotResult<(SupportTicket, TicketMessage)> {
        let body = body.trim();
        if body.is_empty() {
            return Err(LeadpilotError::validation("reply must not be empty"));
        }
        let _ticket = self.guard.try_acquire(RESPOND, ticket_id)?;

        self.tickets
            .respond(TicketResponse {
                ticket_id,
                author_id: self.caller_id,
                status,
                body: body.to_string(),
            })
            .await
    }

    /// Reload after a successful mutation. A failed reload keeps the
    /// previous list; the mutation itself already went through.
    async fn reload(&self) -> Vec<AdminUserRecord> {
        match self.refresh().await {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "Admin user list reload failed");
                self.users()
            }
        }
    }
}
