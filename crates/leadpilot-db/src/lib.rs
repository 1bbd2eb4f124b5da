//! Leadpilot Database: SurrealDB connection management, schema
//! migrations, and implementations of the `leadpilot-core` repository and
//! gateway traits.
//!
//! Schema v1 holds the tables; schema v2 deploys the RPC capabilities as
//! SurrealQL functions. A database that has only seen v1 behaves like a
//! backend whose RPCs have not been provisioned yet.

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager, RootCredentials};
pub use error::DbError;
pub use repository::hash_password;
pub use schema::{run_migrations, schema_v1, schema_v2};
