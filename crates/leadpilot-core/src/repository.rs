//! Repository and gateway trait definitions for data access abstraction.
//!
//! All operations are async. The backend platform is an external
//! collaborator: services in the other crates are generic over these traits
//! and never see the database crate.
//!
//! Gateways model RPC-style capabilities that may not be deployed yet. An
//! absent capability is reported as
//! [`LeadpilotError::CapabilityUnavailable`](crate::error::LeadpilotError::CapabilityUnavailable),
//! never as a generic database error.

use uuid::Uuid;

use crate::error::LeadpilotResult;
use crate::models::{
    admin::AdminUserRecord,
    invitation::{CreateInvitation, Invitation},
    membership::{
        ApprovalStatusMessage, CreateMembership, Membership, OrganizationMembership, RoleChange,
        UpdateMembership,
    },
    organization::{CreateOrganization, Organization, SubscriptionPlan, UpdateOrganization},
    principal::{CreatePrincipal, Principal},
    session::{CreateEmailVerification, CreateSession, EmailVerification, Session, VerificationKind},
    ticket::{CreateTicket, SupportTicket, TicketMessage, TicketResponse},
};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

pub trait PrincipalRepository: Send + Sync {
    /// Fails with `AlreadyExists` when the email is taken.
    fn create(&self, input: CreatePrincipal)
    -> impl Future<Output = LeadpilotResult<Principal>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = LeadpilotResult<Principal>> + Send;
    fn get_by_email(&self, email: &str)
    -> impl Future<Output = LeadpilotResult<Principal>> + Send;
    /// Stamp `email_confirmed_at` (idempotent).
    fn confirm_email(&self, id: Uuid) -> impl Future<Output = LeadpilotResult<Principal>> + Send;
}

pub trait SessionRepository: Send + Sync {
    fn create(&self, input: CreateSession) -> impl Future<Output = LeadpilotResult<Session>> + Send;
    fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = LeadpilotResult<Session>> + Send;
    fn invalidate(&self, id: Uuid) -> impl Future<Output = LeadpilotResult<()>> + Send;
    fn invalidate_principal_sessions(
        &self,
        principal_id: Uuid,
    ) -> impl Future<Output = LeadpilotResult<()>> + Send;
}

pub trait VerificationRepository: Send + Sync {
    fn create(
        &self,
        input: CreateEmailVerification,
    ) -> impl Future<Output = LeadpilotResult<EmailVerification>> + Send;
    /// Remove and return the matching record. Single use: a second call with
    /// the same hash fails with `NotFound`.
    fn consume(
        &self,
        token_hash: &str,
        kind: VerificationKind,
    ) -> impl Future<Output = LeadpilotResult<EmailVerification>> + Send;
    fn invalidate_for_principal(
        &self,
        principal_id: Uuid,
        kind: VerificationKind,
    ) -> impl Future<Output = LeadpilotResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Tenancy
// ---------------------------------------------------------------------------

pub trait OrganizationRepository: Send + Sync {
    /// Create the organization and the creator's owner membership
    /// (auto-approved) as one atomic unit.
    fn create_with_owner(
        &self,
        input: CreateOrganization,
        owner_id: Uuid,
    ) -> impl Future<Output = LeadpilotResult<OrganizationMembership>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = LeadpilotResult<Organization>> + Send;
    fn get_by_slug(&self, slug: &str)
    -> impl Future<Output = LeadpilotResult<Organization>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateOrganization,
    ) -> impl Future<Output = LeadpilotResult<Organization>> + Send;
    /// Soft-delete: sets `is_active = false`.
    fn deactivate(&self, id: Uuid) -> impl Future<Output = LeadpilotResult<()>> + Send;
}

pub trait MembershipRepository: Send + Sync {
    /// Fails with `AlreadyExists` for a duplicate (user, organization) pair.
    fn create(
        &self,
        input: CreateMembership,
    ) -> impl Future<Output = LeadpilotResult<Membership>> + Send;
    fn get(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> impl Future<Output = LeadpilotResult<Membership>> + Send;
    /// Memberships that grant access (active, approved, organization
    /// active), most recently joined first.
    fn list_accessible(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = LeadpilotResult<Vec<OrganizationMembership>>> + Send;
    /// Every membership of an organization, regardless of state.
    fn list_for_organization(
        &self,
        organization_id: Uuid,
    ) -> impl Future<Output = LeadpilotResult<Vec<Membership>>> + Send;
    fn update(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        input: UpdateMembership,
    ) -> impl Future<Output = LeadpilotResult<Membership>> + Send;
    /// Apply every change or none of them. Fails with `LastOwner` when the
    /// organization would be left without an active owner.
    fn apply_role_changes(
        &self,
        organization_id: Uuid,
        changes: Vec<RoleChange>,
    ) -> impl Future<Output = LeadpilotResult<Vec<Membership>>> + Send;
    /// Soft-remove a member. Fails with `LastOwner` when the organization
    /// would be left without an active owner.
    fn deactivate(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> impl Future<Output = LeadpilotResult<Membership>> + Send;
    fn record_invitation(
        &self,
        input: CreateInvitation,
    ) -> impl Future<Output = LeadpilotResult<Invitation>> + Send;
}

// ---------------------------------------------------------------------------
// RPC gateways (each call may be absent on the backend)
// ---------------------------------------------------------------------------

pub trait ApprovalGateway: Send + Sync {
    /// `is_user_approved_and_active(user_id)`
    fn is_user_approved_and_active(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = LeadpilotResult<bool>> + Send;
    /// `get_user_approval_status_message(user_id)`
    fn approval_status_message(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = LeadpilotResult<ApprovalStatusMessage>> + Send;
}

pub trait AdminGateway: Send + Sync {
    /// `get_admin_users()`: every membership across every organization.
    fn list_admin_users(&self) -> impl Future<Output = LeadpilotResult<Vec<AdminUserRecord>>> + Send;
    /// `approve_user(user_id)`: pending memberships become approved and
    /// active. `InvalidTransition` when nothing was pending.
    fn approve_user(&self, user_id: Uuid) -> impl Future<Output = LeadpilotResult<()>> + Send;
    /// `reject_user(user_id)`: pending memberships become rejected.
    fn reject_user(&self, user_id: Uuid) -> impl Future<Output = LeadpilotResult<()>> + Send;
    /// Block (`false`) deactivates every active membership the user holds
    /// and marks it blocked; activation (`true`) restores only blocked
    /// memberships. `NotFound` when the user holds no membership at all.
    fn set_user_active(
        &self,
        user_id: Uuid,
        active: bool,
    ) -> impl Future<Output = LeadpilotResult<()>> + Send;
    /// `update_organization_subscription_plan(org_id, plan)` as one call.
    /// Developer-plan organizations are never matched, so they read as
    /// `NotFound`.
    fn update_organization_subscription_plan(
        &self,
        organization_id: Uuid,
        plan: SubscriptionPlan,
    ) -> impl Future<Output = LeadpilotResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Support tickets
// ---------------------------------------------------------------------------

pub trait TicketRepository: Send + Sync {
    fn create(&self, input: CreateTicket)
    -> impl Future<Output = LeadpilotResult<SupportTicket>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = LeadpilotResult<SupportTicket>> + Send;
    fn list_all(&self) -> impl Future<Output = LeadpilotResult<Vec<SupportTicket>>> + Send;
    fn list_for_organization(
        &self,
        organization_id: Uuid,
    ) -> impl Future<Output = LeadpilotResult<Vec<SupportTicket>>> + Send;
    /// Update the ticket status and append the reply atomically.
    fn respond(
        &self,
        input: TicketResponse,
    ) -> impl Future<Output = LeadpilotResult<(SupportTicket, TicketMessage)>> + Send;
    fn messages(
        &self,
        ticket_id: Uuid,
    ) -> impl Future<Output = LeadpilotResult<Vec<TicketMessage>>> + Send;
}
