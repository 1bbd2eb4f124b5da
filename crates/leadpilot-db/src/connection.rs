//! Opening the Leadpilot store.
//!
//! The endpoint is handed to SurrealDB's `any` engine, so the same binary
//! runs against a server (`ws://host:port`) or an embedded in-memory
//! store (`mem://`). Opening always leaves the schema migrated.

use std::fmt;

use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use tracing::{debug, info};

use crate::error::DbError;
use crate::schema::run_migrations;

const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8000";
const DEFAULT_NAMESPACE: &str = "leadpilot";
const DEFAULT_DATABASE: &str = "main";

/// Root login for a SurrealDB server.
#[derive(Clone, PartialEq, Eq)]
pub struct RootCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RootCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where the tenancy store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// `ws://host:port`, `wss://host:port` or `mem://`.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    /// Embedded stores are opened without signing in.
    pub credentials: Option<RootCredentials>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            namespace: DEFAULT_NAMESPACE.into(),
            database: DEFAULT_DATABASE.into(),
            credentials: Some(RootCredentials {
                username: "root".into(),
                password: "root".into(),
            }),
        }
    }
}

impl DbConfig {
    /// An embedded in-memory store. Nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            endpoint: "mem://".into(),
            credentials: None,
            ..Self::default()
        }
    }

    /// Read the `LEADPILOT_DB_*` variables through `lookup`.
    ///
    /// A bare `host:port` is taken as a WebSocket address. Credentials
    /// default to `root`/`root` for servers; embedded stores only sign in
    /// when a user is configured explicitly.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let endpoint = lookup("LEADPILOT_DB_URL")
            .filter(|v| !v.is_empty())
            .map(|v| {
                if v.contains("://") {
                    v
                } else {
                    format!("ws://{v}")
                }
            })
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let username = lookup("LEADPILOT_DB_USER");
        let credentials = match username {
            Some(username) => Some(RootCredentials {
                username,
                password: lookup("LEADPILOT_DB_PASS").unwrap_or_default(),
            }),
            None if is_embedded(&endpoint) => None,
            None => Some(RootCredentials {
                username: "root".into(),
                password: lookup("LEADPILOT_DB_PASS").unwrap_or_else(|| "root".into()),
            }),
        };

        Self {
            endpoint,
            namespace: lookup("LEADPILOT_DB_NS").unwrap_or_else(|| DEFAULT_NAMESPACE.into()),
            database: lookup("LEADPILOT_DB_NAME").unwrap_or_else(|| DEFAULT_DATABASE.into()),
            credentials,
        }
    }

    pub fn is_embedded(&self) -> bool {
        is_embedded(&self.endpoint)
    }
}

fn is_embedded(endpoint: &str) -> bool {
    endpoint.starts_with("mem://")
}

/// An open, migrated connection to the tenancy store.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Any>,
}

impl DbManager {
    /// Connect, sign in when credentials are configured, select the
    /// namespace and database, then apply pending migrations.
    pub async fn open(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            endpoint = %config.endpoint,
            namespace = %config.namespace,
            database = %config.database,
            "Opening tenancy store"
        );

        let db = any::connect(config.endpoint.as_str()).await?;
        if let Some(credentials) = &config.credentials {
            db.signin(Root {
                username: credentials.username.clone(),
                password: credentials.password.clone(),
            })
            .await?;
            debug!(username = %credentials.username, "Signed in as root");
        }
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        run_migrations(&db).await?;
        info!(embedded = config.is_embedded(), "Tenancy store ready");

        Ok(Self { db })
    }

    pub fn client(&self) -> &Surreal<Any> {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_is_the_default_server() {
        assert_eq!(DbConfig::from_lookup(|_| None), DbConfig::default());
    }

    #[test]
    fn bare_host_becomes_websocket_endpoint() {
        let config = DbConfig::from_lookup(lookup(&[
            ("LEADPILOT_DB_URL", "db:8000"),
            ("LEADPILOT_DB_PASS", "secret"),
        ]));
        assert_eq!(config.endpoint, "ws://db:8000");
        let credentials = config.credentials.unwrap();
        assert_eq!(credentials.username, "root");
        assert_eq!(credentials.password, "secret");
    }

    #[test]
    fn embedded_store_skips_sign_in_unless_asked() {
        let config = DbConfig::from_lookup(lookup(&[
            ("LEADPILOT_DB_URL", "mem://"),
            ("LEADPILOT_DB_NS", "scratch"),
        ]));
        assert!(config.is_embedded());
        assert!(config.credentials.is_none());
        assert_eq!(config.namespace, "scratch");

        let config = DbConfig::from_lookup(lookup(&[
            ("LEADPILOT_DB_URL", "mem://"),
            ("LEADPILOT_DB_USER", "ops"),
        ]));
        assert_eq!(config.credentials.unwrap().username, "ops");
    }

    #[test]
    fn password_is_not_printed() {
        let printed = format!("{:?}", DbConfig::default());
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("password: \"root\""));
    }

    #[tokio::test]
    async fn open_in_memory_leaves_schema_migrated() {
        let manager = DbManager::open(&DbConfig::in_memory()).await.unwrap();

        let mut result = manager
            .client()
            .query("SELECT VALUE version FROM _migration")
            .await
            .unwrap();
        let mut versions: Vec<i64> = result.take(0).unwrap();
        versions.sort_unstable();
        assert_eq!(versions, vec![1, 2]);

        // Opening again on a fresh embedded store is independent.
        DbManager::open(&DbConfig::in_memory()).await.unwrap();
    }
}
