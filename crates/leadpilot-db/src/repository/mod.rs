//! SurrealDB repository and gateway implementations.

mod invitation;
mod membership;
mod organization;
mod principal;
mod rpc;
mod session;
mod ticket;
mod verification;

pub use membership::SurrealMembershipRepository;
pub use organization::SurrealOrganizationRepository;
pub use principal::{SurrealPrincipalRepository, hash_password};
pub use rpc::SurrealRpcGateway;
pub use session::SurrealSessionRepository;
pub use ticket::SurrealTicketRepository;
pub use verification::SurrealVerificationRepository;
