//! Environment-driven server configuration.

use std::env;

use leadpilot_auth::AuthConfig;
use leadpilot_db::DbConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db: DbConfig,
    pub auth: AuthConfig,
    /// Where a successful email confirmation lands.
    pub confirm_success_path: String,
    /// Where a failed confirmation lands; an `error` query parameter is
    /// appended.
    pub confirm_error_path: String,
}

impl ServerConfig {
    /// Load `.env` (if present) and read the process environment. Unset or
    /// unparsable values fall back to defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            host: var("HOST", "127.0.0.1"),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            db: DbConfig::from_lookup(&lookup),
            auth: AuthConfig {
                pepper: lookup("LEADPILOT_PEPPER").filter(|p| !p.is_empty()),
                ..AuthConfig::default()
            },
            confirm_success_path: var("CONFIRM_SUCCESS_PATH", "/dashboard"),
            confirm_error_path: var("CONFIRM_ERROR_PATH", "/auth/error"),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = ServerConfig::from_lookup(|_| None);
        assert_eq!(config.addr(), "127.0.0.1:3000");
        assert_eq!(config.db.namespace, "leadpilot");
        assert_eq!(config.confirm_success_path, "/dashboard");
        assert!(config.auth.pepper.is_none());
    }

    #[test]
    fn reads_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "8080"),
            ("LEADPILOT_DB_URL", "db:8000"),
            ("LEADPILOT_PEPPER", "spice"),
            ("CONFIRM_ERROR_PATH", "/oops"),
        ]
        .into_iter()
        .collect();
        let config = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.port, 8080);
        assert_eq!(config.db.endpoint, "ws://db:8000");
        assert_eq!(config.auth.pepper.as_deref(), Some("spice"));
        assert_eq!(config.confirm_error_path, "/oops");
    }

    #[test]
    fn bad_port_falls_back() {
        let config = ServerConfig::from_lookup(|k| (k == "PORT").then(|| "http".to_string()));
        assert_eq!(config.port, 3000);
    }
}
