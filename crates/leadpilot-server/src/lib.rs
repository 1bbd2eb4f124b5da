//! Leadpilot server library: configuration, the email confirmation
//! router and the campaign sync shapes.

pub mod config;
pub mod confirm;
pub mod sync;

pub use config::ServerConfig;
pub use confirm::{ConfirmState, OtpVerifier, router};
