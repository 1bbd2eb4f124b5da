//! Domain models for Leadpilot.
//!
//! These are the core types shared across all crates.

pub mod admin;
pub mod invitation;
pub mod membership;
pub mod organization;
pub mod principal;
pub mod session;
pub mod ticket;
