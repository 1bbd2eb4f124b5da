//! Leadpilot tenancy: which organization a principal works in, with what
//! role, and how membership state is changed safely.
//!
//! Services are generic over the `leadpilot-core` repository traits and
//! never depend on the database crate.

pub mod admin;
pub mod approval;
pub mod confirm;
pub mod context;
pub mod guard;
pub mod resolver;
pub mod selection;
pub mod slug;

pub use admin::{AdminConsole, BlockUser, PlanChange, is_platform_admin};
pub use approval::ApprovalChecker;
pub use confirm::{ActionFailed, Confirmed, PendingAction};
pub use context::{
    ContextSnapshot, ContextState, InviteOutcome, NewOrganization, OrganizationChanges,
    OrganizationContext, RemoveMember,
};
pub use guard::{InFlightGuard, InFlightTicket};
pub use resolver::{MembershipResolver, MembershipSnapshot};
pub use selection::{FileSelectionStore, MemorySelectionStore, SelectionStore};
