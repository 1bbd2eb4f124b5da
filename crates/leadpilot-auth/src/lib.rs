//! Leadpilot session store.
//!
//! Sign-up, sign-in gated on email confirmation and approval, sign-out,
//! one-time verification codes and bearer-token resolution.

pub mod config;
pub mod error;
pub mod password;
pub mod service;
pub mod token;

pub use config::AuthConfig;
pub use error::AuthError;
pub use service::{SessionStore, SignInOutcome, SignUpInput, SignUpOutput, SignedIn};
pub use token::VerificationTicket;
